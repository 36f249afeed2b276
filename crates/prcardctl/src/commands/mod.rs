pub mod diffstat;
pub mod serve;
pub mod test_card;
pub mod validate;

use std::sync::Arc;

use anyhow::Context;
use prcard_core::RelayError;
use prcard_store::{MessageIndex, TokenFile};
use prcard_triggers::{
    AppCredentials, CredentialCache, EventRelay, FeishuPlatform, GitHubPlatform,
};

use crate::config::Settings;

/// Construct the stores and platforms and wire them into a relay
pub(crate) async fn build_relay(settings: &Settings) -> anyhow::Result<Arc<EventRelay>> {
    settings.validate()?;

    let github = Arc::new(
        GitHubPlatform::new(settings.github.clone()).context("Failed to create GitHub platform")?,
    );
    let feishu = Arc::new(
        FeishuPlatform::new(settings.feishu.clone()).context("Failed to create Feishu platform")?,
    );

    let credentials = CredentialCache::load(feishu.clone(), TokenFile::new(&settings.token_path))
        .await
        .with_buffer_secs(settings.token_buffer_secs);

    let index = MessageIndex::open(&settings.message_map_path, settings.max_mappings)
        .await
        .map_err(RelayError::from)
        .with_context(|| {
            format!(
                "Failed to open message map {}",
                settings.message_map_path.display()
            )
        })?;

    let app = AppCredentials {
        app_id: settings.feishu.app_id.clone(),
        app_secret: settings.feishu.app_secret.clone(),
    };

    Ok(Arc::new(EventRelay::new(
        github,
        feishu,
        Arc::new(credentials),
        index,
        app,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfigFile;
    use tempfile::tempdir;

    fn settings_in(dir: &std::path::Path, yaml: &str) -> Settings {
        let yaml = yaml.replace("STATE_DIR", &dir.display().to_string());
        let file: RelayConfigFile = serde_yaml::from_str(&yaml).unwrap();
        file.resolve_with(None, |_| None)
    }

    #[tokio::test]
    async fn test_build_relay_creates_state_directory() {
        let dir = tempdir().unwrap();
        let settings = settings_in(
            dir.path(),
            r#"
spec:
  feishu:
    app_id: cli_1
    app_secret: secret
    chat_id: oc_1
  state:
    directory: STATE_DIR/nested
    max_mappings: 5
"#,
        );

        let relay = build_relay(&settings).await.unwrap();
        assert_eq!(relay.index().max_entries(), 5);
        assert!(dir.path().join("nested").is_dir());
    }

    #[tokio::test]
    async fn test_build_relay_rejects_incomplete_config() {
        let dir = tempdir().unwrap();
        let settings = settings_in(
            dir.path(),
            r#"
spec:
  feishu:
    app_id: cli_1
  state:
    directory: STATE_DIR
"#,
        );

        let err = build_relay(&settings).await.err().unwrap();
        assert!(err.to_string().contains("feishu.app_secret"));
        assert!(matches!(
            err.downcast_ref::<RelayError>(),
            Some(RelayError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_build_relay_reports_unusable_state_directory() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("blocked"), "").unwrap();
        let settings = settings_in(
            dir.path(),
            r#"
spec:
  feishu:
    app_id: cli_1
    app_secret: secret
    chat_id: oc_1
  state:
    directory: STATE_DIR/blocked
"#,
        );

        let err = build_relay(&settings).await.err().unwrap();
        assert!(err.to_string().contains("Failed to open message map"));
        assert!(matches!(
            err.downcast_ref::<RelayError>(),
            Some(RelayError::Storage(_))
        ));
    }
}
