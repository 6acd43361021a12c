
    use super::*;
    use serde_json::json;
    use taskhands_core::{FiringKind, JobParams, TaskDescriptor};

    fn context(params: serde_json::Value) -> JobContext {
        let params: JobParams = match params {
            serde_json::Value::Object(map) => map,
            _ => JobParams::new(),
        };
        let descriptor = TaskDescriptor::new("job-test", "0 * * * * *").with_description("fallback");
        JobContext::from_descriptor(&descriptor, params, FiringKind::Manual, "f-test")
    }

    #[test]
    fn test_catalog_knows_every_builtin_kind() {
        for kind in BUILTIN_KINDS {
            assert!(builtin_job(kind).is_some(), "missing {}", kind);
        }
        assert!(builtin_job("email").is_none());
    }

    #[tokio::test]
    async fn test_log_and_noop_succeed() {
        assert!(LogJob.run(context(json!({"message": "hi"}))).await.is_ok());
        assert!(LogJob.run(context(json!({}))).await.is_ok());
        assert!(NoopJob.run(context(json!({}))).await.is_ok());
    }

    #[tokio::test]
    async fn test_shell_requires_command() {
        let err = ShellJob.run(context(json!({}))).await.unwrap_err();
        assert!(err.to_string().contains("command"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_exit_status() {
        assert!(ShellJob.run(context(json!({"command": "true"}))).await.is_ok());

        let err = ShellJob
            .run(context(json!({"command": "echo broken >&2; exit 3"})))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("exit code 3"));
        assert!(message.contains("broken"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let result = ShellJob
            .run(context(json!({
                "command": "touch marker",
                "cwd": dir.path().to_str().unwrap(),
            })))
            .await;
        assert!(result.is_ok());
        assert!(dir.path().join("marker").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_timeout() {
        let err = ShellJob
            .run(context(json!({"command": "sleep 5", "timeout_secs": 0})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
