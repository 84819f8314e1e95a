use super::{Scaler, scaler::check_width};
use crate::Result;

/// A pass-through scaler, for bundles fitted over raw features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityScaler {
    width: usize,
}

impl IdentityScaler {
    /// Creates a new `IdentityScaler` over `width` features.
    pub fn new(width: usize) -> Self {
        Self { width }
    }
}

impl Scaler for IdentityScaler {
    fn width(&self) -> usize {
        self.width
    }

    fn transform_into(&self, row: &[f32], out: &mut [f32]) -> Result<()> {
        check_width(row.len(), self.width)?;
        check_width(out.len(), self.width)?;
        out.copy_from_slice(row);
        Ok(())
    }
}
