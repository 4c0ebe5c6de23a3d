use crate::colors::ColorScale;
use crate::config::{hex_to_rgba, AppConfig, Extent, GeometryConfig, OutputConfig, StyleConfig};
use crate::data::load_geometry_set;
use crate::processing::{plan_fills, GeometrySet, VintageChain};
use crate::types::ValueRecord;
use anyhow::{Context, Result};
use geo::{Coord, LineString, MultiPolygon};
use image::{imageops, ImageBuffer, Pixel, Rgba, RgbaImage};
use imageproc::drawing::BresenhamLineIter;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info};

const POINTS_PER_INCH: f64 = 72.0;

/// Maps EPSG:3857 metres inside `extent` onto a pixel grid, y pointing down.
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    extent: Extent,
    scale: f64, // pixels per metre
    width: u32,
    height: u32,
}

impl Viewport {
    pub fn new(extent: Extent, dpi: u32, figure_size: f64) -> Self {
        let longest = figure_size * dpi as f64;
        let scale = longest / extent.width().max(extent.height());
        Self {
            extent,
            scale,
            width: ((extent.width() * scale).round() as u32).max(1),
            height: ((extent.height() * scale).round() as u32).max(1),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn projected_to_pixel(&self, c: Coord<f64>) -> (f64, f64) {
        (
            (c.x - self.extent.min_x) * self.scale,
            (self.extent.max_y - c.y) * self.scale,
        )
    }
}

/// Owned drawing surface for one map. Dropping it releases the raster.
pub struct MapCanvas {
    image: RgbaImage,
    viewport: Viewport,
    dpi: u32,
    background: Rgba<u8>,
}

impl MapCanvas {
    pub fn new(viewport: Viewport, dpi: u32, background: Rgba<u8>) -> Self {
        Self {
            image: ImageBuffer::from_pixel(viewport.width(), viewport.height(), background),
            viewport,
            dpi,
            background,
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Line width in points to pixels at the canvas resolution.
    pub fn points_to_pixels(&self, points: f64) -> f64 {
        points * self.dpi as f64 / POINTS_PER_INCH
    }

    /// Even-odd scanline fill of every polygon, holes left untouched.
    pub fn fill(&mut self, geometry: &MultiPolygon<f64>, color: Rgba<u8>) {
        let (w, h) = (self.image.width() as i64, self.image.height() as i64);

        for polygon in geometry {
            let edges: Vec<((f64, f64), (f64, f64))> = std::iter::once(polygon.exterior())
                .chain(polygon.interiors())
                .flat_map(|ring| self.pixel_segments(ring))
                .filter(|(a, b)| a.1 != b.1)
                .collect();
            if edges.is_empty() {
                continue;
            }

            let min_y = edges.iter().map(|(a, b)| a.1.min(b.1)).fold(f64::INFINITY, f64::min);
            let max_y = edges.iter().map(|(a, b)| a.1.max(b.1)).fold(f64::NEG_INFINITY, f64::max);
            let first_row = (min_y.floor() as i64).max(0);
            let last_row = (max_y.ceil() as i64).min(h - 1);

            let mut crossings = Vec::new();
            for row in first_row..=last_row {
                let yc = row as f64 + 0.5;
                crossings.clear();
                for &((x0, y0), (x1, y1)) in &edges {
                    if (y0 > yc) != (y1 > yc) {
                        crossings.push(x0 + (yc - y0) * (x1 - x0) / (y1 - y0));
                    }
                }
                crossings.sort_by(f64::total_cmp);

                for pair in crossings.chunks_exact(2) {
                    // Pixel centres in [pair[0], pair[1])
                    let start = ((pair[0] - 0.5).ceil() as i64).max(0);
                    let end = ((pair[1] - 0.5).ceil() as i64).min(w);
                    for x in start..end {
                        self.image.put_pixel(x as u32, row as u32, color);
                    }
                }
            }
        }
    }

    /// Strokes every ring. Sub-pixel widths are drawn one pixel wide with
    /// proportional coverage; each pixel is blended at most once per call.
    pub fn outline(&mut self, geometry: &MultiPolygon<f64>, color: Rgba<u8>, width_pt: f64) {
        let width_px = self.points_to_pixels(width_pt);
        if width_px <= 0.0 {
            return;
        }
        let half = ((width_px - 1.0) / 2.0).round().max(0.0) as i32;
        let alpha = (width_px.min(1.0) * color[3] as f64).round() as u8;
        let paint = Rgba([color[0], color[1], color[2], alpha]);

        let (w, h) = (self.image.width() as i32, self.image.height() as i32);
        let mut touched: HashSet<(i32, i32)> = HashSet::new();

        for polygon in geometry {
            for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
                for ((x0, y0), (x1, y1)) in self.pixel_segments(ring) {
                    let margin = half as f64 + 1.0;
                    let outside = (x0.max(x1) < -margin)
                        || (y0.max(y1) < -margin)
                        || (x0.min(x1) > w as f64 + margin)
                        || (y0.min(y1) > h as f64 + margin);
                    if outside {
                        continue;
                    }

                    let line = BresenhamLineIter::new((x0 as f32, y0 as f32), (x1 as f32, y1 as f32));
                    for (px, py) in line {
                        for dy in -half..=half {
                            for dx in -half..=half {
                                let (x, y) = (px + dx, py + dy);
                                if x >= 0 && y >= 0 && x < w && y < h {
                                    touched.insert((x, y));
                                }
                            }
                        }
                    }
                }
            }
        }

        for (x, y) in touched {
            self.image.get_pixel_mut(x as u32, y as u32).blend(&paint);
        }
    }

    /// Consumes the canvas, returning the raster cropped to drawn content
    /// plus `pad` pixels on each side.
    pub fn finish(self, pad: u32) -> RgbaImage {
        let Some((min_x, min_y, max_x, max_y)) = self.content_bounds() else {
            return self.image;
        };
        let x = min_x.saturating_sub(pad);
        let y = min_y.saturating_sub(pad);
        let right = max_x.saturating_add(pad).min(self.image.width() - 1);
        let bottom = max_y.saturating_add(pad).min(self.image.height() - 1);
        imageops::crop_imm(&self.image, x, y, right - x + 1, bottom - y + 1).to_image()
    }

    fn content_bounds(&self) -> Option<(u32, u32, u32, u32)> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, pixel) in self.image.enumerate_pixels() {
            if *pixel == self.background {
                continue;
            }
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((a, b, c, d)) => (a.min(x), b.min(y), c.max(x), d.max(y)),
            });
        }
        bounds
    }

    fn pixel_segments<'a>(
        &'a self,
        ring: &'a LineString<f64>,
    ) -> impl Iterator<Item = ((f64, f64), (f64, f64))> + 'a {
        ring.lines().map(move |line| {
            (
                self.viewport.projected_to_pixel(line.start),
                self.viewport.projected_to_pixel(line.end),
            )
        })
    }
}

/// Parsed drawing colors.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub background: Rgba<u8>,
    pub outline: Rgba<u8>,
    pub fill_edge: Rgba<u8>,
    pub country: Rgba<u8>,
}

impl Palette {
    pub fn from_style(style: &StyleConfig) -> Result<Self> {
        Ok(Self {
            background: hex_to_rgba(&style.background)?,
            outline: hex_to_rgba(&style.outline_color)?,
            fill_edge: hex_to_rgba(&style.fill_edge_color)?,
            country: hex_to_rgba(&style.country_color)?,
        })
    }
}

/// Region vintages plus the national boundaries drawn on top.
pub struct MapLayers {
    pub chain: VintageChain,
    pub countries: GeometrySet,
}

impl MapLayers {
    pub fn load(config: &GeometryConfig) -> Result<Self> {
        let sets = config
            .vintages
            .iter()
            .map(|v| load_geometry_set(&v.label, &v.path, &config.id_field))
            .collect::<Result<Vec<_>>>()?;
        let countries = load_geometry_set("countries", &config.countries, &config.id_field)?;
        Ok(Self {
            chain: VintageChain::new(sets),
            countries,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RenderSummary {
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    /// (vintage label, regions filled from it)
    pub filled: Vec<(String, usize)>,
    pub skipped_no_data: usize,
    pub unmatched: Vec<String>,
}

impl RenderSummary {
    pub fn total_filled(&self) -> usize {
        self.filled.iter().map(|(_, n)| n).sum()
    }
}

/// Draws all layers onto `canvas`: region outlines (lowest priority vintage
/// first), value fills in record order, then country outlines.
pub fn draw_map(
    canvas: &mut MapCanvas,
    records: &[ValueRecord],
    layers: &MapLayers,
    scale: &ColorScale,
    style: &StyleConfig,
    palette: &Palette,
) -> (Vec<(String, usize)>, usize, Vec<String>) {
    for set in layers.chain.sets().iter().rev() {
        debug!("Drawing outlines for vintage {}", set.label());
        for region in set.regions() {
            canvas.outline(&region.geometry, palette.outline, style.outline_width);
        }
    }

    let plan = plan_fills(records, &layers.chain, scale);
    for fill in &plan.fills {
        canvas.fill(&fill.region.geometry, fill.color);
        canvas.outline(&fill.region.geometry, palette.fill_edge, style.fill_edge_width);
    }
    let filled = plan.filled_per_vintage(&layers.chain);

    for country in layers.countries.regions() {
        canvas.outline(&country.geometry, palette.country, style.country_width);
    }

    (filled, plan.skipped_no_data, plan.unmatched)
}

/// Renders `records` against preloaded layers and writes `<hint><suffix>.png`.
pub fn render_with_layers(
    records: &[ValueRecord],
    output_hint: &str,
    layers: &MapLayers,
    style: &StyleConfig,
    output: &OutputConfig,
) -> Result<RenderSummary> {
    let scale = ColorScale::new(&style.boundaries)?;
    let palette = Palette::from_style(style)?;
    let viewport = Viewport::new(output.extent, output.dpi, output.figure_size);

    let mut canvas = MapCanvas::new(viewport, output.dpi, palette.background);
    let (filled, skipped_no_data, unmatched) =
        draw_map(&mut canvas, records, layers, &scale, style, &palette);

    let pad = (output.pad_inches * output.dpi as f64).round() as u32;
    let image = canvas.finish(pad);

    let path = output.output_path(output_hint);
    image
        .save(&path)
        .with_context(|| format!("Failed to save map image: {:?}", path))?;

    let summary = RenderSummary {
        output: path,
        width: image.width(),
        height: image.height(),
        filled,
        skipped_no_data,
        unmatched,
    };
    info!(
        "Wrote {:?} ({}x{}): {} filled, {} no-data, {} unmatched",
        summary.output,
        summary.width,
        summary.height,
        summary.total_filled(),
        summary.skipped_no_data,
        summary.unmatched.len()
    );
    Ok(summary)
}

/// Loads the configured geometry and renders one map.
pub fn render_map(records: &[ValueRecord], output_hint: &str, config: &AppConfig) -> Result<RenderSummary> {
    let layers = MapLayers::load(&config.geometry)?;
    render_with_layers(records, output_hint, &layers, &config.style, &config.output)
}
