//! Gateway whose prompt sends wait until the test releases them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{HabitPrompt, LocalGateway, Member, MessageHandle, MessagingGateway};
use crate::error::GatewayError;
use crate::model::{GroupId, UserId};

pub(crate) struct GatedGateway {
    pub inner: Arc<LocalGateway>,
    gate: Notify,
    waiting: AtomicBool,
}

impl GatedGateway {
    pub fn new(inner: Arc<LocalGateway>) -> Self {
        Self {
            inner,
            gate: Notify::new(),
            waiting: AtomicBool::new(false),
        }
    }

    /// Whether a send is parked at the gate.
    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Let one parked (or the next) send through.
    pub fn release(&self) {
        self.gate.notify_one();
    }

    /// Yield until a send is parked at the gate.
    pub async fn wait_for_send(&self) {
        for _ in 0..1_000 {
            if self.is_waiting() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("no prompt send reached the gate");
    }
}

#[async_trait]
impl MessagingGateway for GatedGateway {
    fn cached_member(&self, user: UserId) -> Option<Member> {
        self.inner.cached_member(user)
    }

    async fn fetch_member(&self, user: UserId) -> Result<Option<Member>, GatewayError> {
        self.inner.fetch_member(user).await
    }

    async fn send_prompt(
        &self,
        group: GroupId,
        member: &Member,
        prompt: &HabitPrompt,
    ) -> Result<MessageHandle, GatewayError> {
        self.waiting.store(true, Ordering::SeqCst);
        self.gate.notified().await;
        self.waiting.store(false, Ordering::SeqCst);
        self.inner.send_prompt(group, member, prompt).await
    }

    async fn disable_prompt(&self, handle: &MessageHandle) -> Result<(), GatewayError> {
        self.inner.disable_prompt(handle).await
    }

    async fn create_group_container(&self, name: &str) -> Result<GroupId, GatewayError> {
        self.inner.create_group_container(name).await
    }

    async fn grant_access(&self, user: UserId, group: GroupId) -> Result<(), GatewayError> {
        self.inner.grant_access(user, group).await
    }
}
