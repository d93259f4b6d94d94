use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::{Mutex, OwnedMutexGuard};

use chatmodel_core::{
    config::Config, domain::UserId, handler::ChatHandler, messaging::port::ReplyPort,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub handler: Arc<ChatHandler>,
    pub replies: Arc<dyn ReplyPort>,
    /// The bot's own account, used to drop self-originated messages.
    pub bot_id: UserId,
    pub user_locks: Arc<UserLocks>,
}

/// Serializes turns per user so two messages cannot interleave their
/// load/save of the same context.
#[derive(Default)]
pub struct UserLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub async fn lock_user(&self, user_id: &UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(user_id.0.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Drop `guard` and forget the user's lock if nobody else is queued on it.
    pub async fn release(&self, user_id: &UserId, guard: OwnedMutexGuard<()>) {
        drop(guard);
        let mut map = self.inner.lock().await;
        // The map holds the only reference once no turn is running or waiting.
        if map
            .get(&user_id.0)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(&user_id.0);
        }
    }
}

pub async fn run_polling(cfg: Arc<Config>, handler: Arc<ChatHandler>) -> anyhow::Result<()> {
    let token = cfg
        .telegram_bot_token
        .clone()
        .ok_or_else(|| anyhow::anyhow!("TELEGRAM_BOT_TOKEN is required"))?;
    let bot = Bot::new(token);

    let me = bot.get_me().await?;
    let bot_id = UserId(me.id.0.to_string());
    tracing::info!(
        username = %me.username(),
        model_type = %cfg.model.model_type,
        context_size = cfg.context_size,
        trigger_ratio = cfg.trigger.ratio,
        "telegram bot started"
    );

    let state = Arc::new(AppState {
        cfg,
        handler,
        replies: Arc::new(TelegramMessenger::new(bot.clone())),
        bot_id,
        user_locks: Arc::new(UserLocks::default()),
    });

    let tree = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, tree)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::info!("telegram dispatcher stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_user_turns_are_serialized() {
        let locks = Arc::new(UserLocks::default());
        let alice = UserId("1".to_string());

        let guard = locks.lock_user(&alice).await;

        let waiter = {
            let locks = locks.clone();
            let alice = alice.clone();
            tokio::spawn(async move {
                let _g = locks.lock_user(&alice).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        // A different user is not blocked.
        let _bob = locks.lock_user(&UserId("2".to_string())).await;

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn released_locks_are_forgotten() {
        let locks = Arc::new(UserLocks::default());
        for i in 0..100 {
            let user = UserId(i.to_string());
            let guard = locks.lock_user(&user).await;
            locks.release(&user, guard).await;
        }
        assert!(locks.inner.lock().await.is_empty());
    }

    #[tokio::test]
    async fn release_keeps_lock_while_another_turn_waits() {
        let locks = Arc::new(UserLocks::default());
        let alice = UserId("1".to_string());
        let guard = locks.lock_user(&alice).await;

        let waiter = {
            let locks = locks.clone();
            let alice = alice.clone();
            tokio::spawn(async move {
                let g = locks.lock_user(&alice).await;
                locks.release(&alice, g).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        locks.release(&alice, guard).await;
        waiter.await.unwrap();
        assert!(locks.inner.lock().await.is_empty());
    }
}
