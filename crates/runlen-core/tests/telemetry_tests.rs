#[cfg(feature = "telemetry")]
mod telemetry_enabled_tests {
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Duration;

    use runlen_core::telemetry;
    use runlen_core::telemetry::tags;
    use runlen_core::{
        BufferPool, DefaultWorkerTelemetry, EncodePipeline, EncoderConfig, WorkerTelemetry,
    };
    use tempfile::NamedTempFile;

    static TELEMETRY_TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn parallel_run_records_metrics_for_every_stage() -> Result<(), Box<dyn std::error::Error>> {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");
        telemetry::reset();

        let mut file = NamedTempFile::new()?;
        file.write_all(&b"aaaabbbb".repeat(16))?;
        file.flush()?;
        let empty = NamedTempFile::new()?;

        let pipeline = EncodePipeline::new(EncoderConfig::new(8, 3))?;
        let mut out = Vec::new();
        pipeline.encode_paths(&[file.path(), empty.path()], &mut out)?;

        let snapshot = telemetry::snapshot();
        assert_eq!(snapshot.counter(tags::METRIC_MMAP_OPEN_COUNT), Some(2));
        assert_eq!(snapshot.counter(tags::METRIC_PARTITION_PLAN_COUNT), Some(1));
        assert_eq!(snapshot.counter(tags::METRIC_PARTITION_TASK_COUNT), Some(16));
        assert_eq!(
            snapshot.counter(tags::METRIC_PARTITION_EMPTY_INPUT_COUNT),
            Some(1)
        );
        assert_eq!(snapshot.counter(tags::METRIC_WORKER_TASK_COUNT), Some(16));
        assert_eq!(snapshot.counter(tags::METRIC_EMITTER_FRAGMENT_COUNT), Some(16));
        assert_eq!(
            snapshot.counter(tags::METRIC_EMITTER_BYTES_WRITTEN),
            Some(out.len() as u64)
        );
        assert_eq!(
            snapshot.counter(tags::METRIC_EMITTER_BOUNDARY_MERGE_COUNT),
            None
        );
        assert_eq!(snapshot.counter(tags::METRIC_PIPELINE_RUN_COUNT), Some(1));
        assert_eq!(snapshot.gauge(tags::METRIC_WORKER_ACTIVE_COUNT), Some(0));

        let open_hist = snapshot
            .histogram(tags::METRIC_MMAP_OPEN_LATENCY_US)
            .expect("mmap open histogram missing");
        assert_eq!(open_hist.count, 2);
        Ok(())
    }

    #[test]
    fn buffer_recycling_is_counted() {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");
        telemetry::reset();

        let pool = BufferPool::new(64, 1);
        drop(pool.acquire());
        drop(pool.acquire());

        let snapshot = telemetry::snapshot();
        assert_eq!(
            snapshot.counter(tags::METRIC_BUFFER_ACQUIRE_CREATED_COUNT),
            Some(1)
        );
        assert_eq!(
            snapshot.counter(tags::METRIC_BUFFER_ACQUIRE_RECYCLED_COUNT),
            Some(1)
        );
        assert_eq!(snapshot.counter(tags::METRIC_BUFFER_RECYCLE_OK_COUNT), Some(2));
    }

    #[test]
    fn default_worker_telemetry_tracks_outcomes() {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");
        telemetry::reset();

        let worker_telemetry = DefaultWorkerTelemetry;
        worker_telemetry.on_task_started(0, 0, 4096);
        worker_telemetry.on_task_finished(0, 0, Duration::from_micros(120));
        worker_telemetry.on_task_started(1, 1, 4096);
        worker_telemetry.on_task_failed(1, 1, Duration::from_micros(75));

        let snapshot = telemetry::snapshot();
        assert_eq!(snapshot.gauge(tags::METRIC_WORKER_ACTIVE_COUNT), Some(0));
        assert_eq!(snapshot.counter(tags::METRIC_WORKER_TASK_COUNT), Some(2));
        assert_eq!(snapshot.counter(tags::METRIC_WORKER_TASK_FINISH_COUNT), Some(1));
        assert_eq!(snapshot.counter(tags::METRIC_WORKER_TASK_FAIL_COUNT), Some(1));

        let task_hist = snapshot
            .histogram(tags::METRIC_WORKER_TASK_LATENCY_US)
            .expect("worker task histogram missing");
        assert_eq!(task_hist.count, 2);
        assert_eq!((task_hist.min, task_hist.max), (75, 120));
    }
}

#[cfg(not(feature = "telemetry"))]
mod telemetry_disabled_tests {
    use std::time::Duration;

    use runlen_core::telemetry;
    use runlen_core::telemetry::tags;
    use runlen_core::{DefaultWorkerTelemetry, WorkerTelemetry};

    #[test]
    fn telemetry_api_is_noop_without_feature() {
        telemetry::reset();

        telemetry::increment_counter(tags::METRIC_WORKER_TASK_COUNT, 7, &[]);
        telemetry::record_histogram(tags::METRIC_WORKER_TASK_LATENCY_US, 11, &[]);
        telemetry::set_gauge(tags::METRIC_WORKER_ACTIVE_COUNT, 3, &[]);

        let worker_telemetry = DefaultWorkerTelemetry;
        worker_telemetry.on_task_started(0, 0, 16);
        worker_telemetry.on_task_finished(0, 0, Duration::from_micros(120));

        let snapshot = telemetry::snapshot();
        assert!(snapshot.counters.is_empty());
        assert!(snapshot.gauges.is_empty());
        assert!(snapshot.histograms.is_empty());
    }
}
