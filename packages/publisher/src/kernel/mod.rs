// Shared infrastructure wired once per process

pub mod deps;

pub use deps::PublisherDeps;
