//! Streaming performance-counter backend (§4.C.2).
//!
//! Grounded on `profiler_performance_counters_intel.cpp`'s
//! `m_MetricsStreamCollectionThread`: a background thread drains raw reports
//! from the vendor's IO stream, parses them, and appends calibrated samples
//! to a mutex-protected ring that `read_stream_data` binary-searches.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use crate::backend::counters_query::MetricSet;
use crate::backend::{decode_report, CounterDriver, CounterResult, MetricMetadata, StreamSample};
use crate::errors::CounterError;

/// One raw report as delivered by the vendor's IO stream, before parsing.
pub struct RawReport {
    pub device_ts_ns: u64,
    pub host_ts_ns: u64,
    pub bytes: Vec<u8>,
}

/// Implemented by the interception layer's stream handle: opens an IO stream
/// on the concurrent group with the driver's timer period and yields
/// whatever reports have landed since the last drain.
pub trait RawReportSource: Send {
    /// Drains pending reports. If `drop_oldest` is set and more reports
    /// arrived than the backing buffer holds, older ones are discarded
    /// rather than blocking (§4.C.2 "drop oldest" flag).
    fn drain(&mut self, drop_oldest: bool) -> Vec<RawReport>;
}

const RETENTION: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(1);
const REPORT_BUFFER_CAPACITY: usize = 16 * 1024;

struct SharedState {
    samples: Mutex<VecDeque<StreamSample>>,
    last_delivered_device_ts: std::sync::atomic::AtomicU64,
}

/// A counter backend that captures samples continuously on a worker thread
/// rather than synchronously per query.
pub struct StreamingCounterBackend {
    set_names: Vec<String>,
    sets: Vec<MetricSet>,
    active_set: Arc<AtomicU32>,
    shared: Arc<SharedState>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl StreamingCounterBackend {
    /// Opens the stream on `default_name`'s set (or the first set) and
    /// starts the collector thread over `source`.
    pub fn new(
        sets: Vec<MetricSet>,
        default_name: &str,
        source: impl RawReportSource + 'static,
    ) -> Result<Self, CounterError> {
        if sets.is_empty() {
            return Err(CounterError::NoMetricSetsDiscovered);
        }
        let set_names = sets.iter().map(|set| set.name.clone()).collect();
        let initial = sets
            .iter()
            .position(|set| set.name == default_name)
            .unwrap_or(0) as u32;

        let mut backend = Self {
            set_names,
            sets,
            active_set: Arc::new(AtomicU32::new(initial)),
            shared: Arc::new(SharedState {
                samples: Mutex::new(VecDeque::with_capacity(REPORT_BUFFER_CAPACITY)),
                last_delivered_device_ts: std::sync::atomic::AtomicU64::new(0),
            }),
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: None,
        };
        backend.spawn_collector(source);
        Ok(backend)
    }

    fn metrics_for_active_set(&self) -> &[MetricMetadata] {
        let active = self.active_set.load(Ordering::Acquire) as usize;
        self.sets
            .get(active)
            .map(|set| set.metrics.as_slice())
            .unwrap_or(&[])
    }

    fn spawn_collector(&mut self, mut source: impl RawReportSource + 'static) {
        let active_set = self.active_set.clone();
        let shared = self.shared.clone();
        let shutdown = self.shutdown.clone();
        let metrics_by_set: Vec<Vec<MetricMetadata>> =
            self.sets.iter().map(|set| set.metrics.clone()).collect();

        let handle = std::thread::spawn(move || loop {
            if shutdown.load(Ordering::Acquire) {
                return;
            }

            let drop_oldest = {
                let samples = shared.samples.lock();
                samples.len() >= REPORT_BUFFER_CAPACITY
            };
            let reports = source.drain(drop_oldest);
            let got = reports.len();

            if !reports.is_empty() {
                let set_index = active_set.load(Ordering::Acquire);
                let metrics = metrics_by_set
                    .get(set_index as usize)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);

                let mut samples = shared.samples.lock();
                for report in reports {
                    let results = decode_report(metrics, &report.bytes);
                    shared
                        .last_delivered_device_ts
                        .store(report.device_ts_ns, Ordering::Release);
                    samples.push_back(StreamSample {
                        device_ts_ns: report.device_ts_ns,
                        host_ts_ns: report.host_ts_ns,
                        set_index,
                        results,
                    });
                }

                let cutoff = report_cutoff(&samples, RETENTION);
                while samples
                    .front()
                    .is_some_and(|sample| sample.device_ts_ns < cutoff)
                {
                    samples.pop_front();
                }
            }

            if got * 2 < REPORT_BUFFER_CAPACITY {
                std::thread::sleep(POLL_INTERVAL);
            }
        });

        self.worker = Some(handle);
    }
}

fn report_cutoff(samples: &VecDeque<StreamSample>, retention: Duration) -> u64 {
    let newest = samples.back().map(|sample| sample.device_ts_ns).unwrap_or(0);
    newest.saturating_sub(retention.as_nanos() as u64)
}

impl Drop for StreamingCounterBackend {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl CounterDriver for StreamingCounterBackend {
    fn metric_sets(&self) -> &[String] {
        &self.set_names
    }

    fn metrics_in_set(&self, set_index: u32) -> &[MetricMetadata] {
        self.sets
            .get(set_index as usize)
            .map(|set| set.metrics.as_slice())
            .unwrap_or(&[])
    }

    /// Closes the current stream and reopens it on the new set (§4.C.2).
    fn set_active_set(&mut self, set_index: u32) -> Result<(), CounterError> {
        if set_index as usize >= self.sets.len() {
            return Err(CounterError::InvalidSetIndex(set_index));
        }
        self.active_set.store(set_index, Ordering::Release);
        self.shared.samples.lock().clear();
        Ok(())
    }

    fn active_set(&self) -> u32 {
        self.active_set.load(Ordering::Acquire)
    }

    fn report_size(&self, set_index: u32, _queue_family: u32) -> u32 {
        self.sets
            .get(set_index as usize)
            .map(|set| set.metrics.len() as u32 * 8)
            .unwrap_or(0)
    }

    fn parse_report(
        &self,
        set_index: u32,
        _queue_family: u32,
        bytes: &[u8],
    ) -> Result<Vec<CounterResult>, CounterError> {
        let metrics = self
            .sets
            .get(set_index as usize)
            .ok_or(CounterError::InvalidSetIndex(set_index))?;
        let _ = self.metrics_for_active_set();
        Ok(decode_report(&metrics.metrics, bytes))
    }

    fn supports_query_pool_reuse(&self) -> bool {
        true
    }

    /// Binary-searches on device-timestamp-normalized entries, rebases
    /// timestamps to `begin_device_ts`, and erases consumed entries (§4.C.2).
    fn read_stream_data(
        &mut self,
        begin_device_ts: u64,
        end_device_ts: u64,
    ) -> Option<(Vec<StreamSample>, bool)> {
        let mut samples = self.shared.samples.lock();

        if begin_device_ts == end_device_ts {
            return Some((Vec::new(), true));
        }

        let start = samples.partition_point(|sample| sample.device_ts_ns < begin_device_ts);
        let end = samples.partition_point(|sample| sample.device_ts_ns < end_device_ts);

        let out: Vec<StreamSample> = samples
            .range(start..end)
            .map(|sample| StreamSample {
                device_ts_ns: sample.device_ts_ns - begin_device_ts,
                host_ts_ns: sample.host_ts_ns,
                set_index: sample.set_index,
                results: sample.results.clone(),
            })
            .collect();

        samples.drain(start..end);

        let last_delivered = self.shared.last_delivered_device_ts.load(Ordering::Acquire);
        let complete = last_delivered > end_device_ts;

        Some((out, complete))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CounterStorageKind, CounterUnit};
    use std::sync::mpsc;

    struct ChannelSource(mpsc::Receiver<RawReport>);

    impl RawReportSource for ChannelSource {
        fn drain(&mut self, _drop_oldest: bool) -> Vec<RawReport> {
            self.0.try_iter().collect()
        }
    }

    fn one_metric_set() -> Vec<MetricSet> {
        vec![
            MetricSet {
                name: "A".into(),
                metrics: vec![MetricMetadata {
                    name: "m".into(),
                    category: "c".into(),
                    description: String::new(),
                    storage: CounterStorageKind::U64,
                    unit: CounterUnit::Generic,
                    result_factor: 1.0,
                    uuid: [0; 16],
                }],
            },
            MetricSet {
                name: "B".into(),
                metrics: vec![],
            },
        ]
    }

    #[test]
    fn empty_range_read_is_complete_and_empty() {
        let (_tx, rx) = mpsc::channel();
        let mut backend =
            StreamingCounterBackend::new(one_metric_set(), "A", ChannelSource(rx)).unwrap();
        let (samples, complete) = backend.read_stream_data(1000, 1000).unwrap();
        assert!(samples.is_empty());
        assert!(complete);
    }

    #[test]
    fn collector_thread_parses_and_buffers_reports() {
        let (tx, rx) = mpsc::channel();
        let mut backend =
            StreamingCounterBackend::new(one_metric_set(), "A", ChannelSource(rx)).unwrap();

        tx.send(RawReport {
            device_ts_ns: 100,
            host_ts_ns: 200,
            bytes: 42u64.to_le_bytes().to_vec(),
        })
        .unwrap();

        let mut samples = Vec::new();
        for _ in 0..200 {
            std::thread::sleep(Duration::from_millis(2));
            let (batch, _complete) = backend.read_stream_data(0, 1000).unwrap();
            if !batch.is_empty() {
                samples = batch;
                break;
            }
        }

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].device_ts_ns, 100);
        assert_eq!(samples[0].set_index, 0);
    }

    #[test]
    fn set_active_set_rejects_out_of_range() {
        let (_tx, rx) = mpsc::channel();
        let mut backend =
            StreamingCounterBackend::new(one_metric_set(), "A", ChannelSource(rx)).unwrap();
        assert_eq!(
            backend.set_active_set(9),
            Err(CounterError::InvalidSetIndex(9))
        );
    }
}
