//! Pool statistics for monitoring and health checks.

/// Snapshot of the session pool's state at a point in time.
///
/// Useful for monitoring, logging, and readiness checks.
///
/// # Fields
///
/// | Field | Description |
/// |-------|-------------|
/// | `idle` | Sessions ready for checkout |
/// | `live` | All sessions that exist (idle + checked out) |
/// | `capacity` | Configured pool size |
///
/// # Example
///
/// ```rust
/// use html2pdf_engine::PoolStats;
///
/// let stats = PoolStats { idle: 3, live: 5, capacity: 5 };
/// println!("Pool status: {}/{} idle", stats.idle, stats.capacity);
/// assert!(stats.live <= stats.capacity);
/// ```
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Sessions available for immediate checkout.
    ///
    /// This value can change immediately after reading if another task
    /// checks a session out or in.
    pub idle: usize,

    /// All sessions currently in existence, pooled or checked out.
    pub live: usize,

    /// The configured pool size (`pool_size`); zero resident sessions in
    /// on-demand mode.
    pub capacity: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verifies the stats struct is a plain copyable snapshot.
    #[test]
    fn test_stats_snapshot() {
        let stats = PoolStats {
            idle: 2,
            live: 4,
            capacity: 4,
        };
        let cloned = stats.clone();
        assert_eq!(cloned.idle, 2);
        assert_eq!(cloned.live, 4);
        assert_eq!(cloned.capacity, 4);
    }
}
