//! Integration tests for shell sessions and the session registry

use shellpilot::{AgentError, LaunchMode, SessionRegistry, ShellKind};

/// Unknown shell names are rejected before anything is spawned
#[test]
fn test_unsupported_kind() {
    let err = "fish".parse::<ShellKind>().unwrap_err();
    assert!(matches!(err, AgentError::UnsupportedShellKind(_)));
    assert!(err.to_string().contains("fish"));
}

#[cfg(unix)]
mod unix {
    use super::*;

    #[tokio::test]
    async fn test_open_reports_active_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = SessionRegistry::default();
        let id = registry
            .create(ShellKind::Sh, Some(dir.path()), LaunchMode::Background)
            .await
            .unwrap();

        let status = registry.get_active().unwrap().status();
        assert_eq!(status.id, id);
        assert!(status.is_active);
        assert_eq!(status.command_count, 0);
        assert!(status.last_command.is_none());
        assert_eq!(status.working_dir, dir.path());
        assert!(id.as_str().starts_with("session_1_sh"));

        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_execute_records_history() {
        let mut registry = SessionRegistry::default();
        registry
            .create(ShellKind::Sh, None, LaunchMode::Background)
            .await
            .unwrap();

        let session = registry.get_active_mut().unwrap();
        let out = session.execute("echo one").await.unwrap();
        assert!(out.framed);
        assert_eq!(out.output, "one");

        session.execute("echo two").await.unwrap();
        let status = session.status();
        assert_eq!(status.command_count, 2);
        assert_eq!(status.last_command.as_deref(), Some("echo two"));
        assert_eq!(session.last_output(), "two");

        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_working_directory_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = SessionRegistry::default();
        registry
            .create(ShellKind::Sh, Some(dir.path()), LaunchMode::Background)
            .await
            .unwrap();

        let session = registry.get_active_mut().unwrap();
        session.execute("touch marker.txt").await.unwrap();
        assert!(dir.path().join("marker.txt").exists());

        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_unsupported_platform_registers_nothing() {
        let mut registry = SessionRegistry::default();
        let err = registry
            .try_create(ShellKind::Cmd, None, LaunchMode::Background)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::PlatformMismatch { .. }));
        assert!(registry.is_empty());
        assert!(registry.get_active().is_none());
    }

    #[tokio::test]
    async fn test_close_all_with_dead_sessions() {
        let mut registry = SessionRegistry::default();
        for _ in 0..3 {
            registry
                .create(ShellKind::Sh, None, LaunchMode::Background)
                .await
                .unwrap();
        }

        // kill the active one from the inside
        let out = registry
            .get_active_mut()
            .unwrap()
            .execute("exit 3")
            .await
            .unwrap();
        assert!(!out.alive);

        assert_eq!(registry.close_all().await, 3);
        assert!(registry.is_empty());
        assert!(registry.get_active().is_none());

        // sequence numbers keep growing
        let id = registry
            .create(ShellKind::Sh, None, LaunchMode::Background)
            .await
            .unwrap();
        assert_eq!(id.as_str(), "session_4_sh");
        registry.close_all().await;
    }
}
