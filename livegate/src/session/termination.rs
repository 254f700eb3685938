use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use tracing::debug;

/// Ways a transport can end a connection it is serving.
///
/// Transports implement whichever hooks they expose; the rest report that they are unavailable.
pub trait Termination: Send + Sync {
    fn reject(&self) -> anyhow::Result<()> {
        Err(anyhow!("reject hook unavailable"))
    }

    fn stop(&self) -> anyhow::Result<()> {
        Err(anyhow!("stop hook unavailable"))
    }

    fn teardown(&self) -> anyhow::Result<()> {
        Err(anyhow!("socket teardown unavailable"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMechanism {
    Reject,
    Stop,
    Teardown,
}

/// Closes the connection with the first mechanism that works: reject, then stop, then
/// teardown. Failures are swallowed.
pub fn force_close(conn: &dyn Termination) -> Option<CloseMechanism> {
    for mechanism in [
        CloseMechanism::Reject,
        CloseMechanism::Stop,
        CloseMechanism::Teardown,
    ] {
        let result = match mechanism {
            CloseMechanism::Reject => conn.reject(),
            CloseMechanism::Stop => conn.stop(),
            CloseMechanism::Teardown => conn.teardown(),
        };
        match result {
            Ok(()) => return Some(mechanism),
            Err(e) => debug!(?mechanism, "close attempt failed: {:?}", e),
        }
    }
    None
}

/// Connection handle for request/response transports: rejecting turns into a refusal of the
/// pending request.
#[derive(Debug, Default)]
pub struct RequestConnection {
    rejected: AtomicBool,
}

impl RequestConnection {
    pub fn is_rejected(&self) -> bool {
        self.rejected.load(Ordering::SeqCst)
    }
}

impl Termination for RequestConnection {
    fn reject(&self) -> anyhow::Result<()> {
        self.rejected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// For callbacks that arrive after the connection is already gone.
#[derive(Debug, Default)]
pub struct Detached;

impl Termination for Detached {}

/// Where a connection's stream key may come from, in priority order.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeySource<'a> {
    /// Raw request path, e.g. `/live/smc_abc?token=1`.
    pub path: Option<&'a str>,
    /// Stream path recorded on the transport session.
    pub session_path: Option<&'a str>,
    /// Key passed explicitly by the transport; taken verbatim.
    pub args: Option<&'a str>,
}

pub fn extract_stream_key(source: &KeySource) -> String {
    source
        .path
        .and_then(last_segment)
        .or_else(|| source.session_path.and_then(last_segment))
        .or_else(|| source.args.map(str::trim).filter(|s| !s.is_empty()))
        .unwrap_or(api::UNKNOWN_STREAM_KEY)
        .to_string()
}

fn last_segment(raw: &str) -> Option<&str> {
    let path = raw.split(&['?', '#'][..]).next().unwrap_or_default();
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Scripted {
        reject_ok: bool,
        stop_ok: bool,
        teardown_ok: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    fn outcome(ok: bool) -> anyhow::Result<()> {
        if ok {
            Ok(())
        } else {
            Err(anyhow!("boom"))
        }
    }

    impl Termination for Scripted {
        fn reject(&self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("reject");
            outcome(self.reject_ok)
        }

        fn stop(&self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("stop");
            outcome(self.stop_ok)
        }

        fn teardown(&self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("teardown");
            outcome(self.teardown_ok)
        }
    }

    #[test]
    fn test_force_close_priority() {
        let conn = Scripted {
            reject_ok: true,
            ..Default::default()
        };
        assert_eq!(Some(CloseMechanism::Reject), force_close(&conn));
        assert_eq!(vec!["reject"], *conn.calls.lock().unwrap());

        let conn = Scripted {
            teardown_ok: true,
            ..Default::default()
        };
        assert_eq!(Some(CloseMechanism::Teardown), force_close(&conn));
        assert_eq!(
            vec!["reject", "stop", "teardown"],
            *conn.calls.lock().unwrap()
        );

        let conn = Scripted::default();
        assert_eq!(None, force_close(&conn));
        assert_eq!(None, force_close(&Detached));
    }

    #[test]
    fn test_request_connection() {
        let conn = RequestConnection::default();
        assert!(!conn.is_rejected());
        assert_eq!(Some(CloseMechanism::Reject), force_close(&conn));
        assert!(conn.is_rejected());
    }

    #[test]
    fn test_extract_stream_key() {
        let key = extract_stream_key(&KeySource {
            path: Some("/live/smc_validkey123?token=abc"),
            ..Default::default()
        });
        assert_eq!("smc_validkey123", key);

        let key = extract_stream_key(&KeySource {
            path: Some("/"),
            session_path: Some("/live/smc_fromsession/"),
            args: Some("smc_fromargs"),
        });
        assert_eq!("smc_fromsession", key);

        let key = extract_stream_key(&KeySource {
            args: Some(" ../../etc/passwd "),
            ..Default::default()
        });
        assert_eq!("../../etc/passwd", key);

        assert_eq!("unknown", extract_stream_key(&KeySource::default()));
        assert_eq!(
            "unknown",
            extract_stream_key(&KeySource {
                path: Some(""),
                session_path: Some("?"),
                args: Some("  "),
            })
        );
    }
}
