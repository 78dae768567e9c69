pub mod exec;
pub mod fs;

pub use exec::ExecPlugin;
pub use fs::FsPlugin;
