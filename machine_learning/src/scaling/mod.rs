mod identity;
mod scaler;
mod standard;

pub use identity::IdentityScaler;
pub use scaler::{FeatureScaler, Scaler, ScalerKind};
pub use standard::StandardScaler;
pub(crate) use scaler::check_width;
