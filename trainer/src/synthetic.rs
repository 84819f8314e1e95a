use log::info;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};
use serde_json::{Map, json};

use crate::{
    configs::TARGET_COLUMN,
    data::Row,
    error::{Result, TrainerErr},
};

const YEARS: (i64, i64) = (1970, 2024);
const RUNTIMES: (i64, i64) = (80, 180);
/// Vote counts are log-uniform in `10^2 ..= 10^6.3`, about 100 to 2M.
const LOG_VOTES: (f64, f64) = (2.0, 6.3);
const NOISE_STD: f64 = 0.6;

/// Generates `rows` imdb-like titles with a seeded rng.
///
/// The rating grows slowly with the release year, the runtime and the popularity of the title,
/// plus gaussian noise, and is clipped to `[1, 10]` with one decimal like the real ratings.
pub fn generate(rows: usize, seed: u64) -> Result<Vec<Row>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, NOISE_STD)
        .map_err(|e| TrainerErr::InvalidConfig(format!("rating noise: {e}")))?;

    let titles = (0..rows)
        .map(|_| {
            let year = rng.random_range(YEARS.0..=YEARS.1);
            let runtime = rng.random_range(RUNTIMES.0..=RUNTIMES.1);
            let log_votes = rng.random_range(LOG_VOTES.0..=LOG_VOTES.1);
            let votes = 10f64.powf(log_votes).round() as i64;

            let rating = 5.0
                + 0.02 * (year - 1995) as f64
                + 0.008 * (runtime - 120) as f64
                + 0.35 * (log_votes - 4.0)
                + noise.sample(&mut rng);
            let rating = (rating.clamp(1.0, 10.0) * 10.0).round() / 10.0;

            let mut row = Map::new();
            row.insert("startYear".into(), json!(year));
            row.insert("runtimeMinutes".into(), json!(runtime));
            row.insert("numVotes".into(), json!(votes));
            row.insert(TARGET_COLUMN.into(), json!(rating));
            row
        })
        .collect();

    info!("generated {rows} synthetic titles with seed {seed}");
    Ok(titles)
}
