mod estimator;
mod forest;
mod linear;
mod tree;

pub use estimator::{Algorithm, Estimator, Regressor};
pub use forest::{ForestParams, RandomForest};
pub use linear::LinearRegression;
pub use tree::{Node, RegressionTree, TreeParams};
