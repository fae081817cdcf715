use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Initialize structured logging for the whole process.
pub fn init() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}
