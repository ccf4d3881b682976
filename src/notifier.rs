//! 状态通知器 - 向监听器广播连接状态变化
//! State Notifier - Broadcasts connection state changes to listeners
//!
//! 监听器可以订阅所有变化，也可以只订阅进入某个特定状态的变化。
//! 发布时按订阅顺序调用监听器，且调用时不持有内部锁，因此监听器可以安全地订阅或取消订阅。
//!
//! Listeners subscribe either to every change or only to changes entering one
//! particular state. Publishing invokes listeners in subscription order without
//! holding the internal lock, so a listener may subscribe or unsubscribe safely.

use crate::state::{ConnectionState, ConnectionStateChange};
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
};
use tokio::sync::oneshot;
use tracing::trace;

/// 状态监听器类型定义
/// State listener type definition
pub type StateListener = Arc<dyn Fn(&ConnectionStateChange) + Send + Sync>;

/// Handle returned by a subscription, used to unsubscribe.
/// 订阅返回的句柄，用于取消订阅。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    /// `None` matches every change.
    filter: Option<ConnectionState>,
    listener: StateListener,
    once: bool,
}

/// A typed publish/subscribe facility for `ConnectionStateChange`s.
///
/// 针对 `ConnectionStateChange` 的类型化发布/订阅设施。
pub struct StateNotifier {
    registrations: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
}

impl fmt::Debug for StateNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateNotifier")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

impl Default for StateNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl StateNotifier {
    pub fn new() -> Self {
        Self {
            registrations: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// 注册一个接收所有状态变化的监听器
    /// Registers a listener for every state change
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ConnectionStateChange) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(listener), false)
    }

    /// 注册一个只接收进入 `state` 的变化的监听器
    /// Registers a listener for changes entering `state` only
    pub fn subscribe_to<F>(&self, state: ConnectionState, listener: F) -> ListenerId
    where
        F: Fn(&ConnectionStateChange) + Send + Sync + 'static,
    {
        self.register(Some(state), Arc::new(listener), false)
    }

    /// Returns a receiver that completes on the next change entering `state`.
    ///
    /// 返回一个接收端，在下一次进入 `state` 的变化发生时完成。
    pub fn once(&self, state: ConnectionState) -> oneshot::Receiver<ConnectionStateChange> {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        self.register(
            Some(state),
            Arc::new(move |change: &ConnectionStateChange| {
                let sender = tx.lock().unwrap_or_else(PoisonError::into_inner).take();
                if let Some(sender) = sender {
                    let _ = sender.send(change.clone());
                }
            }),
            true,
        );
        rx
    }

    /// 移除一个监听器，返回它是否存在
    /// Removes a listener, returning whether it was registered
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut registrations = self.lock();
        let before = registrations.len();
        registrations.retain(|registration| registration.id != id);
        registrations.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    /// Delivers `change` to every matching listener in subscription order.
    ///
    /// 按订阅顺序将 `change` 交付给所有匹配的监听器。
    pub fn publish(&self, change: &ConnectionStateChange) {
        let listeners: Vec<StateListener> = {
            let mut registrations = self.lock();
            let matching = registrations
                .iter()
                .filter(|r| r.filter.is_none_or(|state| state == change.current()))
                .map(|r| r.listener.clone())
                .collect();
            registrations.retain(|r| !(r.once && r.filter == Some(change.current())));
            matching
        };

        trace!(
            previous = %change.previous(),
            current = %change.current(),
            listeners = listeners.len(),
            "Publishing state change"
        );

        for listener in listeners {
            listener(change);
        }
    }

    fn register(
        &self,
        filter: Option<ConnectionState>,
        listener: StateListener,
        once: bool,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Registration {
            id,
            filter,
            listener,
            once,
        });
        id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Registration>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ConnectionState::*;

    fn change(previous: ConnectionState, current: ConnectionState) -> ConnectionStateChange {
        ConnectionStateChange::new(previous, current, None)
    }

    #[test]
    fn test_delivery_in_subscription_order() {
        let notifier = StateNotifier::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let log = log.clone();
            notifier.subscribe(move |c| log.lock().unwrap().push((tag, c.current())));
        }

        notifier.publish(&change(Initialized, Connecting));

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                ("first", Connecting),
                ("second", Connecting),
                ("third", Connecting)
            ]
        );
    }

    #[test]
    fn test_filtered_subscription() {
        let notifier = StateNotifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        notifier.subscribe_to(Connected, move |c| seen_clone.lock().unwrap().push(c.previous()));

        notifier.publish(&change(Initialized, Connecting));
        notifier.publish(&change(Connecting, Connected));
        notifier.publish(&change(Connected, Closing));

        assert_eq!(*seen.lock().unwrap(), vec![Connecting]);
    }

    #[test]
    fn test_unsubscribe() {
        let notifier = StateNotifier::new();
        let id = notifier.subscribe(|_| panic!("listener should have been removed"));
        assert_eq!(notifier.listener_count(), 1);

        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        notifier.publish(&change(Initialized, Closed));
    }

    #[test]
    fn test_listener_may_subscribe_during_publish() {
        let notifier = Arc::new(StateNotifier::new());
        let inner = notifier.clone();
        notifier.subscribe(move |_| {
            inner.subscribe(|_| {});
        });

        notifier.publish(&change(Initialized, Connecting));
        assert_eq!(notifier.listener_count(), 2);
    }

    #[tokio::test]
    async fn test_once_fires_a_single_time() {
        let notifier = StateNotifier::new();
        let rx = notifier.once(Closed);

        notifier.publish(&change(Initialized, Connecting));
        assert_eq!(notifier.listener_count(), 1);

        notifier.publish(&change(Connecting, Closed));
        assert_eq!(notifier.listener_count(), 0);

        let received = rx.await.unwrap();
        assert_eq!(received.previous(), Connecting);
        assert_eq!(received.current(), Closed);
    }
}
