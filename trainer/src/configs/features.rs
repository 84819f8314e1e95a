use artifact::FeatureSpec;

/// The column training rows carry their rating in.
pub const TARGET_COLUMN: &str = "averageRating";

/// The base features of the rating model: release year, runtime and vote count.
pub fn imdb_features() -> Vec<FeatureSpec> {
    vec![
        FeatureSpec::discrete("startYear").with_range(Some(1900.0), Some(2030.0)),
        FeatureSpec::discrete("runtimeMinutes").with_range(Some(1.0), Some(600.0)),
        FeatureSpec::discrete("numVotes").with_range(Some(0.0), None),
    ]
}
