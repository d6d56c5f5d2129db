use std::{
    io,
    sync::{Arc, Mutex},
};

use tracing::subscriber::DefaultGuard;

/// JSON log lines written on the current thread while the guard is alive.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    pub fn install() -> (Self, DefaultGuard) {
        let logs = Self::default();
        let writer = logs.clone();

        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_writer(move || writer.clone())
            .finish();

        (logs, tracing::subscriber::set_default(subscriber))
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.buf.lock().unwrap())
            .lines()
            .map(|line| line.to_string())
            .collect()
    }

    /// Whether some line carries every one of `needles`.
    pub fn contains(&self, needles: &[&str]) -> bool {
        self.lines()
            .iter()
            .any(|line| needles.iter().all(|needle| line.contains(needle)))
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tracing::{error, info_span};

    use super::*;

    #[test]
    fn test_captures_json_lines() {
        let (logs, _guard) = CapturedLogs::install();

        let span = info_span!("delete", context = "delete");
        span.in_scope(|| error!(error_message = "boom", error_group = "delete"));

        assert!(logs.contains(&[r#""error_group":"delete""#, r#""context":"delete""#]));
        assert!(!logs.contains(&[r#""error_group":"upload""#]));
    }
}
