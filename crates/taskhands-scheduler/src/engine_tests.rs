
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use taskhands_core::{JobError, StoreJobRegistry, job_fn};

    use crate::trigger::schedules;

    fn counting_job(counter: Arc<AtomicU32>) -> Arc<dyn Job> {
        job_fn(move |_ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    fn sleeping_job(started: Arc<AtomicU32>, duration: Duration) -> Arc<dyn Job> {
        job_fn(move |_ctx| {
            let started = started.clone();
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(duration).await;
                Ok(())
            }
        })
    }

    async fn engine(
        tasks: Vec<(TaskDescriptor, Arc<dyn Job>)>,
        config: SchedulerConfig,
    ) -> (Arc<StoreJobRegistry>, SchedulerCore) {
        let registry = Arc::new(StoreJobRegistry::in_memory());
        for (descriptor, job) in tasks {
            registry.register_task(descriptor, job).await.unwrap();
        }
        let core = SchedulerCore::new(registry.clone(), &config);
        (registry, core)
    }

    async fn wait_for(counter: &AtomicU32, value: u32) {
        while counter.load(Ordering::SeqCst) < value {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Registry whose descriptor reads take half a second.
    struct SlowRegistry(Arc<StoreJobRegistry>);

    #[async_trait::async_trait]
    impl JobRegistry for SlowRegistry {
        async fn resolve(&self, key: &str) -> SchedulerResult<Arc<dyn Job>> {
            self.0.resolve(key).await
        }

        async fn descriptor(&self, key: &str) -> SchedulerResult<TaskDescriptor> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            self.0.descriptor(key).await
        }

        async fn all_descriptors(&self) -> SchedulerResult<Vec<TaskDescriptor>> {
            self.0.all_descriptors().await
        }

        async fn update_descriptor(&self, descriptor: TaskDescriptor) -> SchedulerResult<()> {
            self.0.update_descriptor(descriptor).await
        }
    }

    async fn slow_engine(key: &str) -> Arc<SchedulerCore> {
        let registry = Arc::new(StoreJobRegistry::in_memory());
        registry
            .register_task(
                TaskDescriptor::new(key, schedules::EVERY_HOUR),
                counting_job(Arc::new(AtomicU32::new(0))),
            )
            .await
            .unwrap();
        Arc::new(SchedulerCore::new(
            Arc::new(SlowRegistry(registry)),
            &SchedulerConfig::default(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_start_and_stop() {
        let count = Arc::new(AtomicU32::new(0));
        let (_, core) = engine(
            vec![(
                TaskDescriptor::new("heartbeat", "*/1 * * * * *"),
                counting_job(count.clone()),
            )],
            SchedulerConfig::default(),
        )
        .await;

        assert!(core.start("heartbeat").await.unwrap());
        assert!(core.is_running("heartbeat"));

        wait_for(&count, 1).await;
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        assert!(core.stop("heartbeat").await.unwrap());
        assert!(!core.is_running("heartbeat"));
        assert_eq!(core.state("heartbeat"), Some(TaskState::Stopped));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_registers_once() {
        let count = Arc::new(AtomicU32::new(0));
        let (_, core) = engine(
            vec![(
                TaskDescriptor::new("tick", schedules::EVERY_SECOND),
                counting_job(count.clone()),
            )],
            SchedulerConfig::default(),
        )
        .await;

        let (a, b) = tokio::join!(core.start("tick"), core.start("tick"));
        assert!(a.unwrap() && b.unwrap());
        assert!(core.start("tick").await.unwrap());

        wait_for(&count, 1).await;
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(core.live_keys(), vec!["tick".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let count = Arc::new(AtomicU32::new(0));
        let (_, core) = engine(
            vec![(
                TaskDescriptor::new("tick", schedules::EVERY_SECOND),
                counting_job(count),
            )],
            SchedulerConfig::default(),
        )
        .await;

        // Never started and unknown keys both succeed.
        assert!(core.stop("tick").await.unwrap());
        assert!(core.stop("does-not-exist").await.unwrap());
        assert_eq!(core.state("tick"), None);

        core.start("tick").await.unwrap();
        assert!(core.stop("tick").await.unwrap());
        assert!(core.stop("tick").await.unwrap());
        assert!(!core.is_running("tick"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_then_start_resumes() {
        let count = Arc::new(AtomicU32::new(0));
        let (_, core) = engine(
            vec![(
                TaskDescriptor::new("tick", schedules::EVERY_SECOND),
                counting_job(count.clone()),
            )],
            SchedulerConfig::default(),
        )
        .await;

        core.start("tick").await.unwrap();
        wait_for(&count, 1).await;
        core.stop("tick").await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        core.start("tick").await.unwrap();
        assert_eq!(core.state("tick"), Some(TaskState::Running));
        wait_for(&count, 2).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_firings_are_skipped() {
        let started = Arc::new(AtomicU32::new(0));
        let (_, core) = engine(
            vec![(
                TaskDescriptor::new("slow", schedules::EVERY_SECOND),
                sleeping_job(started.clone(), Duration::from_millis(1500)),
            )],
            SchedulerConfig::default(),
        )
        .await;

        core.start("slow").await.unwrap();
        wait_for(&started, 1).await;

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(core.stats("slow").unwrap().skipped, 1);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(started.load(Ordering::SeqCst), 2);

        core.stop("slow").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_in_flight_firing() {
        let started = Arc::new(AtomicU32::new(0));
        let finished = Arc::new(AtomicU32::new(0));
        let job = {
            let started = started.clone();
            let finished = finished.clone();
            job_fn(move |_ctx| {
                let started = started.clone();
                let finished = finished.clone();
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(700)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
        };
        let (_, core) = engine(
            vec![(TaskDescriptor::new("slow", schedules::EVERY_SECOND), job)],
            SchedulerConfig::default(),
        )
        .await;

        core.start("slow").await.unwrap();
        wait_for(&started, 1).await;
        core.stop("slow").await.unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_job_keeps_schedule() {
        let attempts = Arc::new(AtomicU32::new(0));
        let job = {
            let attempts = attempts.clone();
            job_fn(move |_ctx| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(JobError::failed("downstream unavailable"))
                }
            })
        };
        let (_, core) = engine(
            vec![(TaskDescriptor::new("flaky", schedules::EVERY_SECOND), job)],
            SchedulerConfig::default(),
        )
        .await;

        core.start("flaky").await.unwrap();
        wait_for(&attempts, 3).await;
        assert!(core.is_running("flaky"));

        let stats = core.stats("flaky").unwrap();
        assert!(stats.failed >= 3);
        assert_eq!(stats.succeeded, 0);
        assert_eq!(stats.last_error.as_deref(), Some("downstream unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_job_is_isolated() {
        let attempts = Arc::new(AtomicU32::new(0));
        let job = {
            let attempts = attempts.clone();
            job_fn(move |_ctx| {
                let attempts = attempts.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 10 {
                        panic!("bad state");
                    }
                    Ok(())
                }
            })
        };
        let (_, core) = engine(
            vec![(TaskDescriptor::new("panicky", schedules::EVERY_SECOND), job)],
            SchedulerConfig::default(),
        )
        .await;

        core.start("panicky").await.unwrap();
        wait_for(&attempts, 2).await;
        assert!(core.is_running("panicky"));
        assert!(
            core.stats("panicky")
                .unwrap()
                .last_error
                .unwrap()
                .contains("bad state")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_task_does_not_disturb_neighbour() {
        let good = Arc::new(AtomicU32::new(0));
        let bad = Arc::new(AtomicU32::new(0));
        let failing = {
            let bad = bad.clone();
            job_fn(move |_ctx| {
                let bad = bad.clone();
                async move {
                    bad.fetch_add(1, Ordering::SeqCst);
                    Err(JobError::failed("disk full"))
                }
            })
        };
        let (_, core) = engine(
            vec![
                (
                    TaskDescriptor::new("good", schedules::EVERY_SECOND),
                    counting_job(good.clone()),
                ),
                (TaskDescriptor::new("bad", schedules::EVERY_SECOND), failing),
            ],
            SchedulerConfig::default(),
        )
        .await;

        core.start("good").await.unwrap();
        core.start("bad").await.unwrap();
        wait_for(&bad, 3).await;
        wait_for(&good, 3).await;
        assert!(core.is_running("good"));
        assert!(core.is_running("bad"));

        let good_stats = core.stats("good").unwrap();
        assert!(good_stats.succeeded >= 3);
        assert_eq!(good_stats.failed, 0);
        assert!(good_stats.last_error.is_none());

        let bad_stats = core.stats("bad").unwrap();
        assert!(bad_stats.failed >= 3);
        assert_eq!(bad_stats.succeeded, 0);

        core.stop("good").await.unwrap();
        core.stop("bad").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_stop_does_not_block_other_keys() {
        let started = Arc::new(AtomicU32::new(0));
        let (_, core) = engine(
            vec![
                (
                    TaskDescriptor::new("slow", schedules::EVERY_SECOND),
                    sleeping_job(started.clone(), Duration::from_secs(5)),
                ),
                (
                    TaskDescriptor::new("other", schedules::EVERY_HOUR),
                    counting_job(Arc::new(AtomicU32::new(0))),
                ),
            ],
            SchedulerConfig::default(),
        )
        .await;
        let core = Arc::new(core);

        core.start("slow").await.unwrap();
        wait_for(&started, 1).await;

        let stopping = tokio::spawn({
            let core = core.clone();
            async move { core.stop("slow").await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!stopping.is_finished());

        let started_other = tokio::time::timeout(Duration::from_millis(100), core.start("other"))
            .await
            .expect("start blocked behind another key's stop");
        assert!(started_other.unwrap());
        assert!(core.is_running("other"));
        assert!(!stopping.is_finished());

        assert!(stopping.await.unwrap().unwrap());
        assert!(!core.is_running("slow"));
        assert!(core.is_running("other"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_with_invalid_cron_leaves_task_stopped() {
        let count = Arc::new(AtomicU32::new(0));
        let (_, core) = engine(
            vec![(
                TaskDescriptor::new("tick", schedules::EVERY_SECOND),
                counting_job(count),
            )],
            SchedulerConfig::default(),
        )
        .await;

        core.start("tick").await.unwrap();
        core.update_descriptor(TaskDescriptor::new("tick", "every now and then"))
            .await
            .unwrap();
        // The live schedule keeps running until restarted.
        assert!(core.is_running("tick"));

        let result = core.restart("tick").await;
        assert!(matches!(result, Err(SchedulerError::InvalidSchedule { .. })));
        assert!(!core.is_running("tick"));
        assert_eq!(core.state("tick"), Some(TaskState::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_applies_updated_cron() {
        let count = Arc::new(AtomicU32::new(0));
        let (_, core) = engine(
            vec![(
                TaskDescriptor::new("tick", schedules::EVERY_SECOND),
                counting_job(count.clone()),
            )],
            SchedulerConfig::default(),
        )
        .await;

        core.start("tick").await.unwrap();
        wait_for(&count, 1).await;

        core.update_descriptor(TaskDescriptor::new("tick", "0 0 0 1 1 *"))
            .await
            .unwrap();
        assert!(core.restart("tick").await.unwrap());
        assert!(core.is_running("tick"));

        let after_restart = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_restart);
    }

    #[tokio::test]
    async fn test_restart_never_started_key_starts_it() {
        let (_, core) = engine(
            vec![(
                TaskDescriptor::new("tick", schedules::EVERY_HOUR),
                counting_job(Arc::new(AtomicU32::new(0))),
            )],
            SchedulerConfig::default(),
        )
        .await;

        assert!(core.restart("tick").await.unwrap());
        assert!(core.is_running("tick"));
        core.stop("tick").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_reports_running_throughout() {
        let core = slow_engine("tick").await;
        core.start("tick").await.unwrap();

        let restarting = tokio::spawn({
            let core = core.clone();
            async move { core.restart("tick").await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!restarting.is_finished());
        assert!(core.is_running("tick"));
        assert_eq!(core.state("tick"), Some(TaskState::Running));

        assert!(restarting.await.unwrap().unwrap());
        assert!(core.is_running("tick"));
    }

    #[tokio::test]
    async fn test_unknown_key_leaves_table_unchanged() {
        let (_, core) = engine(vec![], SchedulerConfig::default()).await;

        assert!(matches!(
            core.start("does-not-exist").await,
            Err(SchedulerError::UnknownTask(k)) if k == "does-not-exist"
        ));
        assert!(matches!(
            core.restart("does-not-exist").await,
            Err(SchedulerError::UnknownTask(_))
        ));
        assert!(!core.is_running("does-not-exist"));
        assert_eq!(core.state("does-not-exist"), None);
        assert!(core.live_keys().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_cron_on_first_start_leaves_table_unchanged() {
        let (_, core) = engine(
            vec![(
                TaskDescriptor::new("broken", "61 * * * * *"),
                counting_job(Arc::new(AtomicU32::new(0))),
            )],
            SchedulerConfig::default(),
        )
        .await;

        assert!(matches!(
            core.check_schedule(&TaskDescriptor::new("broken", "61 * * * * *")),
            Err(SchedulerError::InvalidSchedule { .. })
        ));
        assert!(
            core.check_schedule(&TaskDescriptor::new("broken", schedules::EVERY_MINUTE))
                .is_ok()
        );

        let err = core.start("broken").await.unwrap_err();
        assert_eq!(err.code(), "invalid_schedule");
        assert_eq!(core.state("broken"), None);
    }

    #[tokio::test]
    async fn test_try_once_reports_job_outcome() {
        let job = job_fn(|ctx| async move {
            if ctx.params.get("fail").and_then(|v| v.as_bool()) == Some(true) {
                Err(JobError::failed("asked to fail"))
            } else {
                Ok(())
            }
        });
        let (_, core) = engine(
            vec![(TaskDescriptor::new("sync", schedules::EVERY_HOUR), job)],
            SchedulerConfig::default(),
        )
        .await;

        assert!(core.try_once("sync", None).await.unwrap());

        let mut params = JobParams::new();
        params.insert("fail".to_string(), serde_json::json!(true));
        assert!(!core.try_once("sync", Some(params)).await.unwrap());

        // Manual runs never register a schedule.
        assert!(!core.is_running("sync"));
        assert_eq!(core.state("sync"), None);

        let stats = core.stats("sync").unwrap();
        assert_eq!((stats.fired, stats.succeeded, stats.failed), (2, 1, 1));

        assert!(matches!(
            core.try_once("does-not-exist", None).await,
            Err(SchedulerError::UnknownTask(_))
        ));
    }

    #[tokio::test]
    async fn test_try_once_falls_back_to_descriptor_params() {
        let job = job_fn(|ctx| async move {
            match ctx.param_str("target") {
                Some("warehouse") => Ok(()),
                _ => Err(JobError::failed("missing target")),
            }
        });
        let (_, core) = engine(
            vec![(
                TaskDescriptor::new("export", schedules::EVERY_HOUR)
                    .with_param("target", serde_json::json!("warehouse")),
                job,
            )],
            SchedulerConfig::default(),
        )
        .await;

        assert!(core.try_once("export", None).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_once_ignores_busy_marker() {
        let started = Arc::new(AtomicU32::new(0));
        let (_, core) = engine(
            vec![(
                TaskDescriptor::new("slow", schedules::EVERY_SECOND),
                sleeping_job(started.clone(), Duration::from_millis(1500)),
            )],
            SchedulerConfig::default(),
        )
        .await;

        core.start("slow").await.unwrap();
        wait_for(&started, 1).await;
        assert!(core.try_once("slow", None).await.unwrap());
        assert_eq!(started.load(Ordering::SeqCst), 2);
        core.stop("slow").await.unwrap();
    }

    #[tokio::test]
    async fn test_init_all_continues_past_failures() {
        let (_, core) = engine(
            vec![
                (
                    TaskDescriptor::new("good", schedules::EVERY_HOUR),
                    counting_job(Arc::new(AtomicU32::new(0))),
                ),
                (
                    TaskDescriptor::new("bad-cron", "nope"),
                    counting_job(Arc::new(AtomicU32::new(0))),
                ),
            ],
            SchedulerConfig::default(),
        )
        .await;

        let report = core
            .init_all(&[
                TaskDescriptor::new("bad-cron", "nope"),
                TaskDescriptor::new("missing", schedules::EVERY_HOUR),
                TaskDescriptor::new("good", schedules::EVERY_HOUR),
            ])
            .await;

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.started(), 1);
        let failed: Vec<_> = report.failed().iter().map(|o| o.key.clone()).collect();
        assert_eq!(failed, vec!["bad-cron", "missing"]);
        assert!(core.is_running("good"));
        assert!(!core.is_running("bad-cron"));
    }

    #[tokio::test]
    async fn test_list_tasks_merges_running_state() {
        let (_, core) = engine(
            vec![
                (
                    TaskDescriptor::new("b", schedules::EVERY_HOUR).with_sort_order(1),
                    counting_job(Arc::new(AtomicU32::new(0))),
                ),
                (
                    TaskDescriptor::new("a", schedules::EVERY_HOUR).with_sort_order(2),
                    counting_job(Arc::new(AtomicU32::new(0))),
                ),
            ],
            SchedulerConfig::default(),
        )
        .await;

        core.start("a").await.unwrap();
        let tasks = core.list_tasks().await.unwrap();
        let summary: Vec<_> = tasks
            .iter()
            .map(|t| (t.descriptor.key.as_str(), t.running))
            .collect();
        assert_eq!(summary, vec![("b", false), ("a", true)]);

        assert!(core.task("a").await.unwrap().running);
        assert!(matches!(
            core.task("zzz").await,
            Err(SchedulerError::UnknownTask(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_everything_and_refuses_starts() {
        let count = Arc::new(AtomicU32::new(0));
        let (_, core) = engine(
            vec![(
                TaskDescriptor::new("tick", schedules::EVERY_SECOND),
                counting_job(count.clone()),
            )],
            SchedulerConfig::default(),
        )
        .await;

        core.start("tick").await.unwrap();
        wait_for(&count, 1).await;

        let report = core.shutdown().await;
        assert_eq!(report.tasks_stopped, 1);
        assert!(report.drained);
        assert!(core.is_shutting_down());
        assert!(!core.is_running("tick"));

        let fired = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(count.load(Ordering::SeqCst), fired);

        assert!(matches!(
            core.start("tick").await,
            Err(SchedulerError::ShuttingDown)
        ));
        assert!(matches!(
            core.try_once("tick", None).await,
            Err(SchedulerError::ShuttingDown)
        ));
        assert!(core.stop("tick").await.unwrap());

        // Idempotent.
        let again = core.shutdown().await;
        assert_eq!(again.tasks_stopped, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_after_grace_period() {
        let started = Arc::new(AtomicU32::new(0));
        let (_, core) = engine(
            vec![(
                TaskDescriptor::new("stuck", schedules::EVERY_SECOND),
                sleeping_job(started.clone(), Duration::from_secs(3600)),
            )],
            SchedulerConfig::default().with_shutdown_grace_secs(1),
        )
        .await;

        core.start("stuck").await.unwrap();
        wait_for(&started, 1).await;

        let report = core.shutdown().await;
        assert!(!report.drained);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let stats = core.stats("stuck").unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.last_error.as_deref(), Some("Job abandoned during shutdown"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_racing_shutdown_is_refused() {
        let core = slow_engine("tick").await;
        core.start("tick").await.unwrap();
        core.stop("tick").await.unwrap();

        let starting = tokio::spawn({
            let core = core.clone();
            async move { core.start("tick").await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let report = core.shutdown().await;
        assert_eq!(report.tasks_stopped, 0);

        assert!(matches!(
            starting.await.unwrap(),
            Err(SchedulerError::ShuttingDown)
        ));
        assert!(!core.is_running("tick"));
        assert_eq!(core.running_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_racing_shutdown_leaves_task_stopped() {
        let core = slow_engine("tick").await;
        core.start("tick").await.unwrap();

        let restarting = tokio::spawn({
            let core = core.clone();
            async move { core.restart("tick").await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let report = core.shutdown().await;
        assert_eq!(report.tasks_stopped, 1);

        assert!(matches!(
            restarting.await.unwrap(),
            Err(SchedulerError::ShuttingDown)
        ));
        assert!(!core.is_running("tick"));
        assert_eq!(core.state("tick"), Some(TaskState::Stopped));
    }
