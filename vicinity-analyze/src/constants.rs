pub const DEFAULT_BUDGETS_MS: [f64; 4] = [10.0, 25.0, 50.0, 85.0];
pub const DEFAULT_SAMPLES: usize = 10;
pub const DEFAULT_NEIGHBORS: usize = 10;
pub const DEFAULT_PAIRS: usize = 0;
pub const DEFAULT_SEED: u64 = 0x5eed;
pub const DEFAULT_LOG_FILTER: &str =
    "vicinity_analyze=info,vicinity_client=info,vicinity_core=warn";
