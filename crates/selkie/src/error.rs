pub type Result<T> = std::result::Result<T, Error>;

/// Host-side protocol faults. The layout pipeline itself never fails: bad
/// coordinates, unknown edge endpoints, and stale responses all degrade
/// silently. The only hard error the host can observe is losing its worker.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("layout worker disconnected")]
    WorkerDisconnected,
}
