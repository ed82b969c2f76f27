use std::sync::{Mutex, PoisonError};

use rusqlite::{Row, ToSql};

use super::connector::Connector;
use crate::error::Result;

/// Wraps a [`Connector`] so every statement is preceded by a ping, and a
/// failed ping reopens the store. Only a failed reopen reaches the caller.
///
/// Reconnection runs under its own mutex and pings again inside it, so a
/// thread never closes a handle another thread has just reopened.
pub struct Reconnecting<C> {
    inner: C,
    reconnect: Mutex<()>,
}

impl<C: Connector> Reconnecting<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            reconnect: Mutex::new(()),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn ensure_alive(&self) -> Result<()> {
        if self.inner.ping().is_ok() {
            return Ok(());
        }

        let _guard = self.reconnect.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = self.inner.ping() {
            tracing::warn!(error = %e, "revision store unreachable, reconnecting");
            self.inner.close();
            self.inner.open()?;
            tracing::info!("revision store reconnected");
        }
        Ok(())
    }
}

impl<C: Connector> Connector for Reconnecting<C> {
    fn open(&self) -> Result<()> {
        self.inner.open()
    }

    fn close(&self) {
        self.inner.close()
    }

    fn ping(&self) -> Result<()> {
        self.inner.ping()
    }

    fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> Result<usize> {
        self.ensure_alive()?;
        self.inner.execute(sql, params)
    }

    fn query(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
        on_row: &mut dyn FnMut(&Row<'_>) -> rusqlite::Result<()>,
    ) -> Result<()> {
        self.ensure_alive()?;
        self.inner.query(sql, params, on_row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SwarmcdError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-memory connector that counts opens and can be made unreachable.
    #[derive(Default)]
    struct FlakyConnector {
        open: AtomicBool,
        opens: AtomicUsize,
        refuse_open: AtomicBool,
    }

    impl Connector for FlakyConnector {
        fn open(&self) -> Result<()> {
            if self.refuse_open.load(Ordering::SeqCst) {
                return Err(SwarmcdError::StorageInit {
                    location: "flaky".into(),
                    reason: "disk gone".into(),
                });
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.open.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn close(&self) {
            self.open.store(false, Ordering::SeqCst);
        }

        fn ping(&self) -> Result<()> {
            if self.open.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(SwarmcdError::NotConnected)
            }
        }

        fn execute(&self, _sql: &str, _params: &[&dyn ToSql]) -> Result<usize> {
            self.ping().map(|_| 1)
        }

        fn query(
            &self,
            _sql: &str,
            _params: &[&dyn ToSql],
            _on_row: &mut dyn FnMut(&Row<'_>) -> rusqlite::Result<()>,
        ) -> Result<()> {
            self.ping()
        }
    }

    #[test]
    fn healthy_connection_is_not_reopened() {
        let c = Reconnecting::new(FlakyConnector::default());
        c.open().unwrap();
        c.execute("UPDATE x", &[]).unwrap();
        c.execute("UPDATE x", &[]).unwrap();
        assert_eq!(c.inner().opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_connection_is_reopened_transparently() {
        let c = Reconnecting::new(FlakyConnector::default());
        c.open().unwrap();
        c.inner().close();

        assert_eq!(c.execute("UPDATE x", &[]).unwrap(), 1);
        c.query("SELECT x", &[], &mut |_| Ok(())).unwrap();
        assert_eq!(c.inner().opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_callers_reopen_a_dropped_connection_once() {
        let c = Reconnecting::new(FlakyConnector::default());
        c.open().unwrap();
        let barrier = std::sync::Barrier::new(16);

        for _ in 0..50 {
            c.inner().close();
            std::thread::scope(|s| {
                for _ in 0..16 {
                    s.spawn(|| {
                        barrier.wait();
                        c.execute("UPDATE x", &[]).unwrap();
                    });
                }
            });
        }

        // one initial open plus exactly one reopen per dropped connection
        assert_eq!(c.inner().opens.load(Ordering::SeqCst), 51);
    }

    #[test]
    fn failed_reopen_surfaces_the_error() {
        let c = Reconnecting::new(FlakyConnector::default());
        c.open().unwrap();
        c.inner().close();
        c.inner().refuse_open.store(true, Ordering::SeqCst);

        let err = c.execute("UPDATE x", &[]).unwrap_err();
        assert!(matches!(err, SwarmcdError::StorageInit { .. }));
    }
}
