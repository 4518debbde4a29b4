pub mod config;
pub mod error;
pub mod mdp;
pub mod split;
pub mod tree;

/// dimensional analysis types
pub type Value = f64;
pub type Reward = f64;
pub type Probability = f64;
pub type Discount = f64;

// solver defaults
const UPDATE_ERROR: f64 = 0.1;
const MAX_UPDATES: usize = 10;
const SEEDED_MAX_UPDATES: usize = 100;

/// trait for random generation, mainly (strictly?) for testing
pub trait Arbitrary {
    fn random() -> Self;
}

/// initialize terminal logging for collaborators that want the core's
/// log::debug! / log::trace! output on screen. the core itself only ever
/// writes through the log facade.
pub fn init() {
    simplelog::TermLogger::init(
        log::LevelFilter::Debug,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
    .expect("initialize logger");
}
