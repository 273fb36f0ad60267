mod seed;

pub use seed::SeedTask;
