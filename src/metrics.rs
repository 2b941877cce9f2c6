//! Engine metrics in Prometheus text exposition format.
//!
//! The collector owns all observability counters and is shared behind an
//! `Arc`; every mutation takes a short critical section. `render()`
//! produces the full text exposition for the transport layer to serve.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Instant;

const DETECTION_RATE_ALPHA: f64 = 0.05;

#[derive(Debug)]
struct Histogram {
    buckets: Vec<f64>,
    bucket_counts: Vec<u64>,
    count: u64,
    sum: f64,
}

impl Histogram {
    fn new(mut buckets: Vec<f64>) -> Self {
        buckets.sort_by(f64::total_cmp);
        let len = buckets.len();
        Self {
            buckets,
            bucket_counts: vec![0; len],
            count: 0,
            sum: 0.0,
        }
    }

    fn observe(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        for (bound, count) in self.buckets.iter().zip(self.bucket_counts.iter_mut()) {
            if value <= *bound {
                *count += 1;
            }
        }
    }

    fn render(&self, name: &str, help: &str, out: &mut String) {
        out.push_str(&format!("# HELP {name} {help}\n"));
        out.push_str(&format!("# TYPE {name} histogram\n"));
        for (bound, count) in self.buckets.iter().zip(self.bucket_counts.iter()) {
            out.push_str(&format!("{name}_bucket{{le=\"{bound}\"}} {count}\n"));
        }
        out.push_str(&format!("{name}_bucket{{le=\"+Inf\"}} {}\n", self.count));
        out.push_str(&format!("{name}_sum {:.6}\n", self.sum));
        out.push_str(&format!("{name}_count {}\n", self.count));
    }
}

#[derive(Debug, Default)]
struct Inner {
    gesture_counts: BTreeMap<String, u64>,
    sequence_counts: BTreeMap<String, u64>,
    trajectory_counts: BTreeMap<String, u64>,
    bimanual_counts: BTreeMap<String, u64>,
    frames_total: u64,
    hands_total: u64,
    malformed_total: u64,
    active_connections: i64,
    hand_detection_rate: f64,
    latency: Option<Histogram>,
}

#[derive(Debug)]
pub struct MetricsCollector {
    inner: Mutex<Inner>,
    started: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(vec![0.001, 0.002, 0.005, 0.010, 0.020, 0.033, 0.050, 0.100])
    }
}

impl MetricsCollector {
    pub fn new(latency_buckets: Vec<f64>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                latency: Some(Histogram::new(latency_buckets)),
                ..Inner::default()
            }),
            started: Instant::now(),
        }
    }

    pub fn record_gesture(&self, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        *inner.gesture_counts.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn record_sequence(&self, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        *inner.sequence_counts.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn record_trajectory(&self, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        *inner.trajectory_counts.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn record_bimanual(&self, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        *inner.bimanual_counts.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn record_frame(&self, latency_seconds: f64, hands_detected: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.frames_total += 1;
        inner.hands_total += hands_detected as u64;
        if let Some(latency) = inner.latency.as_mut() {
            latency.observe(latency_seconds);
        }
        let rate = if hands_detected > 0 { 1.0 } else { 0.0 };
        inner.hand_detection_rate = (1.0 - DETECTION_RATE_ALPHA) * inner.hand_detection_rate
            + DETECTION_RATE_ALPHA * rate;
    }

    pub fn record_malformed(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.malformed_total += 1;
    }

    pub fn set_connections(&self, count: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.active_connections = count;
    }

    pub fn frames_total(&self) -> u64 {
        self.inner.lock().unwrap().frames_total
    }

    pub fn malformed_total(&self) -> u64 {
        self.inner.lock().unwrap().malformed_total
    }

    pub fn gesture_counts(&self) -> BTreeMap<String, u64> {
        self.inner.lock().unwrap().gesture_counts.clone()
    }

    /// Prometheus text exposition of every metric.
    pub fn render(&self) -> String {
        let inner = self.inner.lock().unwrap();
        let mut out = String::new();

        out.push_str("# HELP gesture_engine_uptime_seconds Time since engine start\n");
        out.push_str("# TYPE gesture_engine_uptime_seconds gauge\n");
        out.push_str(&format!(
            "gesture_engine_uptime_seconds {:.1}\n\n",
            self.started.elapsed().as_secs_f64()
        ));

        render_counter_family(
            &mut out,
            "gesture_engine_gestures_total",
            "Total gesture detections by name",
            "gesture",
            &inner.gesture_counts,
        );
        render_counter_family(
            &mut out,
            "gesture_engine_sequences_total",
            "Total sequence detections",
            "sequence",
            &inner.sequence_counts,
        );
        render_counter_family(
            &mut out,
            "gesture_engine_trajectories_total",
            "Total trajectory matches",
            "trajectory",
            &inner.trajectory_counts,
        );
        render_counter_family(
            &mut out,
            "gesture_engine_bimanual_total",
            "Total bimanual gesture detections",
            "gesture",
            &inner.bimanual_counts,
        );

        if let Some(latency) = &inner.latency {
            latency.render(
                "gesture_engine_frame_latency_seconds",
                "Frame processing latency in seconds",
                &mut out,
            );
            out.push('\n');
        }

        out.push_str("# HELP gesture_engine_frames_total Total frames processed\n");
        out.push_str("# TYPE gesture_engine_frames_total counter\n");
        out.push_str(&format!(
            "gesture_engine_frames_total {}\n\n",
            inner.frames_total
        ));

        out.push_str(
            "# HELP gesture_engine_hands_detected_total Total hands detected across all frames\n",
        );
        out.push_str("# TYPE gesture_engine_hands_detected_total counter\n");
        out.push_str(&format!(
            "gesture_engine_hands_detected_total {}\n\n",
            inner.hands_total
        ));

        out.push_str("# HELP gesture_engine_malformed_input_total Frames dropped as malformed\n");
        out.push_str("# TYPE gesture_engine_malformed_input_total counter\n");
        out.push_str(&format!(
            "gesture_engine_malformed_input_total {}\n\n",
            inner.malformed_total
        ));

        out.push_str(
            "# HELP gesture_engine_hand_detection_rate Exponential moving average of hand detection\n",
        );
        out.push_str("# TYPE gesture_engine_hand_detection_rate gauge\n");
        out.push_str(&format!(
            "gesture_engine_hand_detection_rate {:.4}\n\n",
            inner.hand_detection_rate
        ));

        out.push_str("# HELP gesture_engine_active_connections Current subscriber connections\n");
        out.push_str("# TYPE gesture_engine_active_connections gauge\n");
        out.push_str(&format!(
            "gesture_engine_active_connections {}\n",
            inner.active_connections
        ));

        out
    }
}

fn render_counter_family(
    out: &mut String,
    name: &str,
    help: &str,
    label: &str,
    counts: &BTreeMap<String, u64>,
) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} counter\n"));
    for (key, count) in counts {
        out.push_str(&format!("{name}{{{label}=\"{key}\"}} {count}\n"));
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn empty_render_has_zero_frames() {
        let metrics = MetricsCollector::default();
        let text = metrics.render();
        assert!(text.contains("gesture_engine_frames_total 0"));
        assert!(text.contains("gesture_engine_malformed_input_total 0"));
    }

    #[test]
    fn counters_appear_with_labels() {
        let metrics = MetricsCollector::default();
        metrics.record_gesture("fist");
        metrics.record_gesture("fist");
        metrics.record_sequence("release");
        metrics.record_trajectory("swipe_right");
        metrics.record_bimanual("clap");
        let text = metrics.render();
        assert!(text.contains("gesture_engine_gestures_total{gesture=\"fist\"} 2"));
        assert!(text.contains("gesture_engine_sequences_total{sequence=\"release\"} 1"));
        assert!(text.contains("gesture_engine_trajectories_total{trajectory=\"swipe_right\"} 1"));
        assert!(text.contains("gesture_engine_bimanual_total{gesture=\"clap\"} 1"));
    }

    #[test]
    fn histogram_buckets_are_cumulative_and_monotone() {
        let metrics = MetricsCollector::new(vec![0.001, 0.01, 0.1]);
        metrics.record_frame(0.0005, 1);
        metrics.record_frame(0.005, 1);
        metrics.record_frame(0.05, 1);
        metrics.record_frame(5.0, 1);
        let text = metrics.render();
        assert!(text.contains("gesture_engine_frame_latency_seconds_bucket{le=\"0.001\"} 1"));
        assert!(text.contains("gesture_engine_frame_latency_seconds_bucket{le=\"0.01\"} 2"));
        assert!(text.contains("gesture_engine_frame_latency_seconds_bucket{le=\"0.1\"} 3"));
        assert!(text.contains("gesture_engine_frame_latency_seconds_bucket{le=\"+Inf\"} 4"));
        assert!(text.contains("gesture_engine_frame_latency_seconds_count 4"));
    }

    #[test]
    fn detection_rate_moves_toward_observation() {
        let metrics = MetricsCollector::default();
        for _ in 0..200 {
            metrics.record_frame(0.001, 1);
        }
        let text = metrics.render();
        // EMA should be close to 1.0 after a long run of detections.
        let rate_line = text
            .lines()
            .find(|l| l.starts_with("gesture_engine_hand_detection_rate "))
            .unwrap();
        let rate: f64 = rate_line.split_whitespace().nth(1).unwrap().parse().unwrap();
        assert!(rate > 0.9);
    }

    #[test]
    fn connections_gauge_tracks_set_value() {
        let metrics = MetricsCollector::default();
        metrics.set_connections(3);
        assert!(metrics.render().contains("gesture_engine_active_connections 3"));
    }

    #[test]
    fn concurrent_recording_is_consistent() {
        let metrics = Arc::new(MetricsCollector::default());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let metrics = Arc::clone(&metrics);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    metrics.record_gesture("test");
                    metrics.record_frame(0.001, 1);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.frames_total(), 400);
        assert_eq!(metrics.gesture_counts()["test"], 400);
    }
}
