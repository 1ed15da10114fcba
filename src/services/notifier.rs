use async_trait::async_trait;
use uuid::Uuid;

use crate::models::target::CompletionSubject;

/// Hook into the surrounding course platform, called once an assessment has
/// been passed: unlock the next lesson, issue a certificate and so on.
#[async_trait]
pub trait CourseProgressNotifier: Send + Sync {
    async fn on_assessment_passed(
        &self,
        user_id: Uuid,
        subject: CompletionSubject,
    ) -> anyhow::Result<()>;
}

/// Logs passes and does nothing else.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl CourseProgressNotifier for TracingNotifier {
    async fn on_assessment_passed(
        &self,
        user_id: Uuid,
        subject: CompletionSubject,
    ) -> anyhow::Result<()> {
        tracing::info!(%user_id, ?subject, "assessment passed");
        Ok(())
    }
}
