use std::fs::File;
use std::future::Future;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::Deserialize;

use super::{Accuracy, FixError, PositionSource};
use crate::model::Fix;
use crate::prelude::*;

/// One line of a recorded track
#[derive(Debug, Deserialize)]
struct TrackPoint {
    lat: f64,
    lon: f64,
    #[serde(default, alias = "accuracy_meters")]
    accuracy: Option<f64>,
}

/// Plays back a recorded track, one point per request.
///
/// Tracks are JSON lines: `{"lat": 37.77, "lon": -122.41, "accuracy": 5.0}`.
pub struct ReplaySource {
    fixes: Vec<Fix>,
    cursor: AtomicUsize,
    looped: bool,
}

impl ReplaySource {
    pub fn new(fixes: Vec<Fix>, looped: bool) -> Self {
        Self {
            fixes,
            cursor: AtomicUsize::new(0),
            looped,
        }
    }

    pub fn load(path: &Path, looped: bool) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open track {}", path.display()))?;
        Self::parse(BufReader::new(file), looped)
            .with_context(|| format!("Failed to read track {}", path.display()))
    }

    fn parse(reader: impl BufRead, looped: bool) -> Result<Self> {
        let mut fixes = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let point: TrackPoint =
                serde_json::from_str(&line).with_context(|| format!("Invalid track point on line {}", i + 1))?;
            fixes.push(Fix::new(point.lat, point.lon, point.accuracy));
        }
        Ok(Self::new(fixes, looped))
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    fn next(&self) -> Result<Fix, FixError> {
        if self.fixes.is_empty() {
            return Err(FixError::ProviderDisabled);
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        let i = if self.looped { i % self.fixes.len() } else { i };
        self.fixes.get(i).copied().ok_or(FixError::ProviderDisabled)
    }
}

impl PositionSource for ReplaySource {
    fn get_fix(
        &self,
        _accuracy: Accuracy,
        _timeout: Duration,
    ) -> impl Future<Output = Result<Fix, FixError>> + Send {
        let res = self.next();
        async move { res }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACK: &str = r#"{"lat": 1.0, "lon": 2.0, "accuracy": 5.0}

{"lat": 1.5, "lon": 2.5}
{"lat": 2.0, "lon": 3.0, "accuracy_meters": -1.0}
"#;

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_plays_in_order_then_stops() {
        let replay = ReplaySource::parse(TRACK.as_bytes(), false).unwrap();
        assert_eq!(replay.len(), 3);

        let first = replay.get_fix(Accuracy::Best, TIMEOUT).await.unwrap();
        assert_eq!(first, Fix::new(1.0, 2.0, Some(5.0)));
        let second = replay.get_fix(Accuracy::Best, TIMEOUT).await.unwrap();
        assert_eq!(second.accuracy_meters, None);
        let third = replay.get_fix(Accuracy::Best, TIMEOUT).await.unwrap();
        assert_eq!(third.accuracy_meters, None);

        assert_eq!(
            replay.get_fix(Accuracy::Best, TIMEOUT).await,
            Err(FixError::ProviderDisabled)
        );
    }

    #[tokio::test]
    async fn test_looped_wraps_around() {
        let replay = ReplaySource::parse(TRACK.as_bytes(), true).unwrap();
        for _ in 0..3 {
            replay.get_fix(Accuracy::Best, TIMEOUT).await.unwrap();
        }
        let again = replay.get_fix(Accuracy::Best, TIMEOUT).await.unwrap();
        assert_eq!(again.coordinate.lat, 1.0);
    }

    #[test]
    fn test_bad_line_reports_position() {
        let err = ReplaySource::parse("{\"lat\": 1.0}\n".as_bytes(), false)
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("line 1"));
    }

    #[tokio::test]
    async fn test_empty_track_is_disabled() {
        let replay = ReplaySource::new(Vec::new(), true);
        assert_eq!(
            replay.get_fix(Accuracy::Best, TIMEOUT).await,
            Err(FixError::ProviderDisabled)
        );
    }
}
