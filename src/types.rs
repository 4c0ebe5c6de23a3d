use geo::MultiPolygon;

/// One row of the value table.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRecord {
    pub node: String, // NUTS2 code
    pub value: f64,
}

impl ValueRecord {
    pub fn new(node: impl Into<String>, value: f64) -> Self {
        Self {
            node: node.into(),
            value,
        }
    }

    /// Zero and NaN both mark a region without data.
    pub fn is_no_data(&self) -> bool {
        self.value == 0.0 || self.value.is_nan()
    }
}

#[derive(Debug, Clone)]
pub struct RegionGeometry {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
}
