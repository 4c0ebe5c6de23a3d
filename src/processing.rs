use crate::colors::ColorScale;
use crate::types::{RegionGeometry, ValueRecord};
use image::Rgba;
use std::collections::HashMap;
use tracing::debug;

/// Regions of one boundary release, kept in file order.
#[derive(Debug, Clone)]
pub struct GeometrySet {
    label: String,
    regions: Vec<RegionGeometry>,
    index: HashMap<String, usize>,
}

impl GeometrySet {
    pub fn new(label: impl Into<String>, regions: Vec<RegionGeometry>) -> Self {
        let mut index = HashMap::with_capacity(regions.len());
        for (i, region) in regions.iter().enumerate() {
            // First occurrence of a duplicated id wins
            index.entry(region.id.clone()).or_insert(i);
        }
        Self {
            label: label.into(),
            regions,
            index,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn regions(&self) -> &[RegionGeometry] {
        &self.regions
    }

    pub fn get(&self, id: &str) -> Option<&RegionGeometry> {
        self.index.get(id).map(|&i| &self.regions[i])
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }
}

/// Geometry sets probed in priority order; the first set holding a code wins.
#[derive(Debug, Clone, Default)]
pub struct VintageChain {
    sets: Vec<GeometrySet>,
}

impl VintageChain {
    pub fn new(sets: Vec<GeometrySet>) -> Self {
        Self { sets }
    }

    pub fn sets(&self) -> &[GeometrySet] {
        &self.sets
    }

    /// Returns the position of the matching set along with its geometry.
    pub fn resolve(&self, code: &str) -> Option<(usize, &RegionGeometry)> {
        self.sets
            .iter()
            .enumerate()
            .find_map(|(i, set)| set.get(code).map(|region| (i, region)))
    }
}

#[derive(Debug, Clone)]
pub struct Fill<'a> {
    pub node: &'a str,
    pub vintage: usize,
    pub region: &'a RegionGeometry,
    pub color: Rgba<u8>,
}

#[derive(Debug, Default)]
pub struct FillPlan<'a> {
    pub fills: Vec<Fill<'a>>,
    pub skipped_no_data: usize,
    pub unmatched: Vec<String>,
}

impl FillPlan<'_> {
    /// Fill count per set of `chain`, in priority order.
    pub fn filled_per_vintage(&self, chain: &VintageChain) -> Vec<(String, usize)> {
        chain
            .sets()
            .iter()
            .enumerate()
            .map(|(i, set)| {
                let count = self.fills.iter().filter(|f| f.vintage == i).count();
                (set.label().to_string(), count)
            })
            .collect()
    }
}

/// Resolves every record against the chain, in input order.
pub fn plan_fills<'a>(
    records: &'a [ValueRecord],
    chain: &'a VintageChain,
    scale: &ColorScale,
) -> FillPlan<'a> {
    let mut plan = FillPlan::default();

    for record in records {
        if record.is_no_data() {
            plan.skipped_no_data += 1;
            continue;
        }

        match chain.resolve(&record.node) {
            Some((vintage, region)) => plan.fills.push(Fill {
                node: &record.node,
                vintage,
                region,
                color: scale.color(record.value),
            }),
            None => {
                debug!("No geometry for region {}", record.node);
                plan.unmatched.push(record.node.clone());
            }
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_BOUNDARIES;
    use geo::{polygon, MultiPolygon};

    fn region(id: &str, offset: f64) -> RegionGeometry {
        RegionGeometry {
            id: id.to_string(),
            geometry: MultiPolygon::new(vec![polygon![
                (x: offset, y: 0.0),
                (x: offset + 1.0, y: 0.0),
                (x: offset + 1.0, y: 1.0),
                (x: offset, y: 0.0),
            ]]),
        }
    }

    fn chain() -> VintageChain {
        VintageChain::new(vec![
            GeometrySet::new("2021", vec![region("DE21", 0.0), region("FRK2", 1.0)]),
            GeometrySet::new("2016", vec![region("DE21", 10.0), region("UKI3", 2.0)]),
        ])
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let set = GeometrySet::new("x", vec![region("A", 0.0), region("A", 5.0)]);
        assert_eq!(set.len(), 2);
        let found = set.get("A").unwrap();
        assert_eq!(found.geometry.0[0].exterior().0[0].x, 0.0);
    }

    #[test]
    fn test_resolve_prefers_first_vintage() {
        let chain = chain();
        let (vintage, region) = chain.resolve("DE21").unwrap();
        assert_eq!(vintage, 0);
        assert_eq!(region.geometry.0[0].exterior().0[0].x, 0.0);

        let (vintage, _) = chain.resolve("UKI3").unwrap();
        assert_eq!(vintage, 1);
        assert!(chain.resolve("XX99").is_none());
    }

    #[test]
    fn test_plan_rules() {
        let chain = chain();
        let scale = ColorScale::new(&DEFAULT_BOUNDARIES).unwrap();
        let records = vec![
            ValueRecord::new("DE21", 0.347),
            ValueRecord::new("FRK2", 0.0),
            ValueRecord::new("UKI3", 0.9),
            ValueRecord::new("XX99", 0.6),
        ];

        let plan = plan_fills(&records, &chain, &scale);

        assert_eq!(plan.skipped_no_data, 1);
        assert_eq!(plan.unmatched, vec!["XX99".to_string()]);
        assert_eq!(plan.fills.len(), 2);

        assert_eq!(plan.fills[0].node, "DE21");
        assert_eq!(plan.fills[0].vintage, 0);
        assert_eq!(plan.fills[0].color, scale.colors()[10]);

        assert_eq!(plan.fills[1].node, "UKI3");
        assert_eq!(plan.fills[1].vintage, 1);
        assert_eq!(plan.fills[1].color, scale.color(0.9));
    }

    #[test]
    fn test_nan_is_no_data() {
        let chain = chain();
        let scale = ColorScale::new(&DEFAULT_BOUNDARIES).unwrap();
        let records = vec![
            ValueRecord::new("DE21", f64::NAN),
            ValueRecord::new("UKI3", 0.4),
        ];

        let plan = plan_fills(&records, &chain, &scale);

        assert_eq!(plan.skipped_no_data, 1);
        assert!(plan.unmatched.is_empty());
        assert_eq!(plan.fills.len(), 1);
        assert_eq!(plan.fills[0].node, "UKI3");
        assert!(plan.fills.iter().all(|f| f.color != scale.colors()[0]));
    }

    #[test]
    fn test_filled_per_vintage() {
        let chain = chain();
        let scale = ColorScale::new(&DEFAULT_BOUNDARIES).unwrap();
        let records = vec![
            ValueRecord::new("DE21", 0.5),
            ValueRecord::new("UKI3", 0.5),
            ValueRecord::new("FRK2", 0.5),
            ValueRecord::new("XX99", 0.5),
        ];
        let plan = plan_fills(&records, &chain, &scale);
        assert_eq!(
            plan.filled_per_vintage(&chain),
            vec![("2021".to_string(), 2), ("2016".to_string(), 1)]
        );
    }

    #[test]
    fn test_plan_keeps_input_order() {
        let chain = chain();
        let scale = ColorScale::new(&DEFAULT_BOUNDARIES).unwrap();
        let records = vec![
            ValueRecord::new("UKI3", 0.1),
            ValueRecord::new("DE21", 0.2),
            ValueRecord::new("UKI3", 0.3),
        ];
        let plan = plan_fills(&records, &chain, &scale);
        let nodes: Vec<&str> = plan.fills.iter().map(|f| f.node).collect();
        assert_eq!(nodes, vec!["UKI3", "DE21", "UKI3"]);
    }
}
