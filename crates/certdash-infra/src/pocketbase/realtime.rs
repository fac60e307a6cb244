//! RealtimeHub -- one PocketBase SSE connection shared by every listener.
//!
//! Listeners register per topic with an mpsc sender. The hub keeps a
//! reference count per topic: the remote subscription set is only re-posted
//! when a topic gains its first listener or loses its last. The connection is
//! opened lazily on the first subscribe and closed when the last topic goes.
//!
//! The first listener of a topic drives its handshake. Listeners that join
//! while it is pending wait for the same outcome, and a failed handshake
//! rolls back every listener of the topic.
//!
//! Reconnects are handled by `reqwest-eventsource`; every `PB_CONNECT` carries
//! a fresh client id, after which the current topic set is submitted again.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::StreamExt;
use reqwest::Method;
use reqwest_eventsource::{Event, EventSource};
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use certdash_types::error::RepositoryError;

use super::client::PocketBaseClient;
use super::types::{ConnectEvent, SubscriptionRequest};

const REALTIME_PATH: &str = "/api/realtime";
const CONNECT_EVENT: &str = "PB_CONNECT";

/// Identifies one listener across all of its topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Server-side state of one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Handshake {
    Pending,
    Active,
    Failed(String),
}

struct Topic<T> {
    listeners: HashMap<ListenerId, mpsc::UnboundedSender<T>>,
    handshake: watch::Sender<Handshake>,
}

impl<T> Topic<T> {
    fn new() -> Self {
        let (handshake, _) = watch::channel(Handshake::Pending);
        Self {
            listeners: HashMap::new(),
            handshake,
        }
    }
}

enum Registration {
    Redundant,
    First,
    Joined(watch::Receiver<Handshake>),
}

/// Rolls a topic back if its opening subscribe is dropped mid-handshake.
struct PendingTopic<'a, T>
where
    T: DeserializeOwned + Clone + Send + 'static,
{
    hub: &'a RealtimeHub<T>,
    topic: &'a str,
    settled: bool,
}

impl<T> Drop for PendingTopic<'_, T>
where
    T: DeserializeOwned + Clone + Send + 'static,
{
    fn drop(&mut self) {
        if !self.settled {
            self.hub.abandon_topic(
                self.topic,
                "subscription dropped before the realtime handshake finished".to_string(),
            );
        }
    }
}

/// Multiplexes realtime topics over a single SSE connection.
///
/// Messages are decoded once into `T` and cloned to each listener of the
/// topic. Always held in an `Arc`.
pub struct RealtimeHub<T> {
    client: Arc<PocketBaseClient>,
    topics: DashMap<String, Topic<T>>,
    client_id: watch::Sender<Option<String>>,
    connection: Mutex<Option<JoinHandle<()>>>,
    submit_lock: tokio::sync::Mutex<()>,
    next_listener: AtomicU64,
    connect_timeout: Duration,
    _payload: PhantomData<fn() -> T>,
}

impl<T> RealtimeHub<T>
where
    T: DeserializeOwned + Clone + Send + 'static,
{
    pub fn new(client: Arc<PocketBaseClient>, connect_timeout: Duration) -> Arc<Self> {
        let (client_id, _) = watch::channel(None);
        Arc::new(Self {
            client,
            topics: DashMap::new(),
            client_id,
            connection: Mutex::new(None),
            submit_lock: tokio::sync::Mutex::new(()),
            next_listener: AtomicU64::new(1),
            connect_timeout,
            _payload: PhantomData,
        })
    }

    /// Allocate a new listener id.
    pub fn listener(&self) -> ListenerId {
        ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of topics with at least one listener.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn listener_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, |entry| entry.listeners.len())
    }

    pub fn is_connected(&self) -> bool {
        self.client_id.borrow().is_some()
    }

    /// Register `listener` on `topic`, delivering decoded messages to `sender`.
    ///
    /// Returns `Ok(false)` if the listener is already registered on the topic.
    /// Otherwise resolves once the topic's handshake has an outcome: the first
    /// listener waits for the connection and posts the updated subscription
    /// set, later listeners wait for that result. On failure every listener
    /// of the topic is rolled back and each caller gets the error.
    pub async fn subscribe(
        self: &Arc<Self>,
        topic: &str,
        listener: ListenerId,
        sender: mpsc::UnboundedSender<T>,
    ) -> Result<bool, RepositoryError> {
        match self.register_local(topic, listener, sender) {
            Registration::Redundant => Ok(false),
            Registration::Joined(handshake) => {
                self.await_handshake(topic, listener, handshake).await?;
                Ok(true)
            }
            Registration::First => {
                self.open_topic(topic).await?;
                Ok(true)
            }
        }
    }

    /// Remove `listener` from `topic`. Delivery stops immediately; the remote
    /// subscription set is updated in the background. Idempotent.
    pub fn unsubscribe(self: &Arc<Self>, topic: &str, listener: ListenerId) {
        if !self.unregister_local(topic, listener) {
            return;
        }
        tracing::debug!(topic, "realtime topic released");

        if self.topics.is_empty() {
            self.disconnect();
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let hub = Arc::clone(self);
                handle.spawn(async move {
                    if let Err(err) = hub.submit_subscriptions().await {
                        tracing::debug!(error = %err, "failed to shrink realtime subscriptions");
                    }
                });
            }
            Err(_) => {
                tracing::debug!("no runtime to update realtime subscriptions; server keeps extra topic");
            }
        }
    }

    async fn open_topic(self: &Arc<Self>, topic: &str) -> Result<(), RepositoryError> {
        let mut pending = PendingTopic {
            hub: self,
            topic,
            settled: false,
        };
        self.ensure_connected();
        let result = self.submit_subscriptions().await;
        pending.settled = true;

        match result {
            Ok(()) => {
                if let Some(entry) = self.topics.get(topic) {
                    entry.handshake.send_replace(Handshake::Active);
                }
                tracing::debug!(topic, "realtime topic subscribed");
                Ok(())
            }
            Err(err) => {
                self.abandon_topic(topic, err.to_string());
                Err(err)
            }
        }
    }

    async fn await_handshake(
        &self,
        topic: &str,
        listener: ListenerId,
        mut handshake: watch::Receiver<Handshake>,
    ) -> Result<(), RepositoryError> {
        let outcome = handshake
            .wait_for(|state| *state != Handshake::Pending)
            .await
            .map(|state| state.clone());
        match outcome {
            Ok(Handshake::Active) => Ok(()),
            Ok(Handshake::Failed(message)) => Err(RepositoryError::Realtime(message)),
            Ok(Handshake::Pending) | Err(_) => {
                self.unregister_local(topic, listener);
                Err(RepositoryError::Realtime(
                    "realtime topic closed during its handshake".to_string(),
                ))
            }
        }
    }

    /// Drop `topic` with all of its listeners and publish the failure to the
    /// ones still waiting on the handshake.
    fn abandon_topic(&self, topic: &str, message: String) {
        if let Some((_, entry)) = self.topics.remove(topic) {
            let rolled_back = entry.listeners.len();
            entry.handshake.send_replace(Handshake::Failed(message));
            tracing::debug!(topic, rolled_back, "realtime topic rolled back");
        }
        if self.topics.is_empty() {
            self.disconnect();
        }
    }

    fn register_local(
        &self,
        topic: &str,
        listener: ListenerId,
        sender: mpsc::UnboundedSender<T>,
    ) -> Registration {
        let mut entry = self.topics.entry(topic.to_string()).or_insert_with(Topic::new);
        if entry.listeners.contains_key(&listener) {
            return Registration::Redundant;
        }
        let first = entry.listeners.is_empty();
        entry.listeners.insert(listener, sender);
        if first {
            entry.handshake.send_replace(Handshake::Pending);
            Registration::First
        } else {
            Registration::Joined(entry.handshake.subscribe())
        }
    }

    /// Returns true when the topic lost its last listener.
    fn unregister_local(&self, topic: &str, listener: ListenerId) -> bool {
        let emptied = {
            let Some(mut entry) = self.topics.get_mut(topic) else {
                return false;
            };
            if entry.listeners.remove(&listener).is_none() {
                return false;
            }
            entry.listeners.is_empty()
        };
        if emptied {
            self.topics.remove_if(topic, |_, entry| entry.listeners.is_empty());
        }
        emptied
    }

    fn active_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .topics
            .iter()
            .filter(|entry| !entry.value().listeners.is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        topics.sort();
        topics
    }

    /// Deliver one realtime message to the listeners of `topic`.
    ///
    /// Returns the number of listeners reached.
    fn dispatch(&self, topic: &str, data: &str) -> usize {
        let senders: Vec<mpsc::UnboundedSender<T>> = match self.topics.get(topic) {
            Some(entry) => entry.listeners.values().cloned().collect(),
            None => return 0,
        };
        let payload = match serde_json::from_str::<T>(data) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(topic, error = %err, "undecodable realtime message");
                return 0;
            }
        };
        senders
            .iter()
            .filter(|sender| sender.send(payload.clone()).is_ok())
            .count()
    }

    async fn handle_message(&self, event: &str, data: &str) {
        if event != CONNECT_EVENT {
            let delivered = self.dispatch(event, data);
            tracing::trace!(topic = event, delivered, "realtime message");
            return;
        }

        match serde_json::from_str::<ConnectEvent>(data) {
            Ok(connect) => {
                tracing::debug!(client_id = %connect.client_id, "realtime connected");
                self.client_id.send_replace(Some(connect.client_id));
                if self.topics.is_empty() {
                    return;
                }
                if let Err(err) = self.submit_subscriptions().await {
                    tracing::warn!(error = %err, "failed to restore realtime subscriptions");
                }
            }
            Err(err) => tracing::warn!(error = %err, "malformed realtime handshake"),
        }
    }

    /// Post the current topic set for the current client id.
    async fn submit_subscriptions(&self) -> Result<(), RepositoryError> {
        self.wait_for_client_id().await?;
        let _guard = self.submit_lock.lock().await;
        let client_id = self
            .client_id
            .borrow()
            .clone()
            .ok_or_else(|| RepositoryError::Realtime("realtime connection lost".to_string()))?;
        let subscriptions = self.active_topics();
        let body = SubscriptionRequest {
            client_id: &client_id,
            subscriptions: &subscriptions,
        };
        self.client
            .send_empty(self.client.request(Method::POST, REALTIME_PATH).json(&body))
            .await
            .map_err(|err| RepositoryError::Realtime(format!("subscription update failed: {err}")))?;
        tracing::debug!(topics = subscriptions.len(), "realtime subscriptions submitted");
        Ok(())
    }

    async fn wait_for_client_id(&self) -> Result<String, RepositoryError> {
        let mut rx = self.client_id.subscribe();
        let wait = async {
            rx.wait_for(Option::is_some)
                .await
                .map(|id| id.clone().unwrap_or_default())
        };
        match tokio::time::timeout(self.connect_timeout, wait).await {
            Ok(Ok(id)) => Ok(id),
            Ok(Err(_)) => Err(RepositoryError::Realtime("realtime hub dropped".to_string())),
            Err(_) => Err(RepositoryError::Realtime(format!(
                "no realtime connection after {}s",
                self.connect_timeout.as_secs()
            ))),
        }
    }

    fn ensure_connected(self: &Arc<Self>) {
        let mut connection = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        if connection.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let request = self.client.stream_request(Method::GET, REALTIME_PATH);
        let source = match EventSource::new(request) {
            Ok(source) => source,
            Err(err) => {
                tracing::error!(error = ?err, "cannot open realtime stream");
                return;
            }
        };
        tracing::debug!("opening realtime connection");
        *connection = Some(tokio::spawn(Self::pump(Arc::downgrade(self), source)));
    }

    fn disconnect(&self) {
        let task = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            tracing::debug!("realtime connection closed");
        }
        self.client_id.send_replace(None);
    }

    /// Read the SSE stream until the hub is dropped or the task is aborted.
    async fn pump(hub: Weak<Self>, mut source: EventSource) {
        while let Some(event) = source.next().await {
            let Some(hub) = hub.upgrade() else { break };
            match event {
                Ok(Event::Open) => tracing::trace!("realtime stream open"),
                Ok(Event::Message(message)) => {
                    hub.handle_message(&message.event, &message.data).await;
                }
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    tracing::debug!("realtime stream ended, reconnecting");
                    hub.client_id.send_replace(None);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "realtime stream error");
                    hub.client_id.send_replace(None);
                }
            }
        }
        source.close();
    }
}

impl<T> Drop for RealtimeHub<T> {
    fn drop(&mut self) {
        if let Some(task) = self
            .connection
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certdash_types::config::BackendConfig;
    use serde::Deserialize;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Ping {
        n: u32,
    }

    fn hub_at(url: &str, connect_timeout: Duration) -> Arc<RealtimeHub<Ping>> {
        let client = PocketBaseClient::new(&BackendConfig {
            url: url.to_string(),
            ..BackendConfig::default()
        })
        .unwrap();
        RealtimeHub::new(Arc::new(client), connect_timeout)
    }

    fn hub() -> Arc<RealtimeHub<Ping>> {
        hub_at("http://127.0.0.1:9", Duration::from_millis(50))
    }

    /// Answers every request with 204 and forwards each JSON body it receives.
    async fn recording_server() -> (String, mpsc::UnboundedReceiver<serde_json::Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let body = read_json_body(&mut socket).await;
                    let _ = socket
                        .write_all(b"HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n")
                        .await;
                    if let Some(body) = body {
                        let _ = tx.send(body);
                    }
                });
            }
        });
        (url, rx)
    }

    async fn read_json_body(socket: &mut TcpStream) -> Option<serde_json::Value> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let header_end = loop {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break end + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
        let length: usize = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0);
        while buf.len() < header_end + length {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        serde_json::from_slice(&buf[header_end..header_end + length]).ok()
    }

    #[tokio::test]
    async fn topics_are_reference_counted() {
        let hub = hub();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (a, b) = (hub.listener(), hub.listener());

        assert!(matches!(hub.register_local("t", a, tx.clone()), Registration::First));
        assert!(matches!(hub.register_local("t", b, tx.clone()), Registration::Joined(_)));
        assert!(matches!(hub.register_local("t", a, tx), Registration::Redundant));
        assert_eq!(hub.listener_count("t"), 2);

        assert!(!hub.unregister_local("t", a));
        assert!(!hub.unregister_local("t", a));
        assert!(hub.unregister_local("t", b));
        assert_eq!(hub.topic_count(), 0);
    }

    #[tokio::test]
    async fn dispatch_reaches_only_topic_listeners() {
        let hub = hub();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        hub.register_local("t1", hub.listener(), tx1);
        hub.register_local("t2", hub.listener(), tx2);

        assert_eq!(hub.dispatch("t1", r#"{"n":7}"#), 1);
        assert_eq!(hub.dispatch("other", r#"{"n":8}"#), 0);
        assert_eq!(hub.dispatch("t1", "not json"), 0);

        assert_eq!(rx1.try_recv().unwrap(), Ping { n: 7 });
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery_immediately() {
        let hub = hub();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (keep_tx, _keep_rx) = mpsc::unbounded_channel();
        let listener = hub.listener();
        hub.register_local("t", listener, tx);
        hub.register_local("other", hub.listener(), keep_tx);

        hub.unsubscribe("t", listener);
        hub.unsubscribe("t", listener);

        assert_eq!(hub.dispatch("t", r#"{"n":1}"#), 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(hub.topic_count(), 1);
    }

    #[tokio::test]
    async fn handshake_sets_client_id() {
        let hub = hub();
        assert!(!hub.is_connected());

        hub.handle_message(CONNECT_EVENT, r#"{"clientId":"abc"}"#).await;

        assert!(hub.is_connected());
        assert_eq!(hub.wait_for_client_id().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn subscribe_without_server_times_out_and_rolls_back() {
        let hub = hub();
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = hub.subscribe("t", hub.listener(), tx).await;

        assert!(matches!(result, Err(RepositoryError::Realtime(_))));
        assert_eq!(hub.topic_count(), 0);
        assert!(hub.connection.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn listeners_joining_a_failing_handshake_all_get_the_error() {
        let hub = hub();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (a, b) = (hub.listener(), hub.listener());

        let (first, second) = tokio::join!(
            hub.subscribe("workflow_run/r1", a, tx.clone()),
            hub.subscribe("workflow_run/r1", b, tx),
        );

        assert!(matches!(first, Err(RepositoryError::Realtime(_))));
        assert!(matches!(second, Err(RepositoryError::Realtime(_))));
        assert_eq!(hub.listener_count("workflow_run/r1"), 0);
        assert_eq!(hub.topic_count(), 0);
        assert!(!hub.is_connected());
    }

    #[tokio::test]
    async fn joining_listener_waits_for_the_handshake() {
        let hub = hub();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            hub.register_local("t", hub.listener(), tx.clone()),
            Registration::First
        ));

        let joiner = tokio::spawn({
            let hub = Arc::clone(&hub);
            let listener = hub.listener();
            async move { hub.subscribe("t", listener, tx).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!joiner.is_finished());

        if let Some(entry) = hub.topics.get("t") {
            entry.handshake.send_replace(Handshake::Active);
        }
        assert!(joiner.await.unwrap().unwrap());
        assert_eq!(hub.listener_count("t"), 2);
    }

    #[tokio::test]
    async fn dropped_opening_subscribe_rolls_back_its_topic() {
        let hub = hub_at("http://127.0.0.1:9", Duration::from_secs(5));
        let (tx, _rx) = mpsc::unbounded_channel();

        let timed_out =
            tokio::time::timeout(Duration::from_millis(20), hub.subscribe("t", hub.listener(), tx))
                .await;

        assert!(timed_out.is_err());
        assert_eq!(hub.topic_count(), 0);
        assert!(hub.connection.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn reconnect_resubmits_topics_and_keeps_dispatching() {
        let (url, mut submitted) = recording_server().await;
        let hub = hub_at(&url, Duration::from_secs(1));
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register_local("workflow_run/r2", hub.listener(), tx.clone());
        hub.register_local("workflow_run/r1", hub.listener(), tx);

        hub.handle_message(CONNECT_EVENT, r#"{"clientId":"c1"}"#).await;
        assert_eq!(
            submitted.recv().await.unwrap(),
            json!({"clientId": "c1", "subscriptions": ["workflow_run/r1", "workflow_run/r2"]})
        );

        hub.handle_message(CONNECT_EVENT, r#"{"clientId":"c2"}"#).await;
        assert_eq!(
            submitted.recv().await.unwrap(),
            json!({"clientId": "c2", "subscriptions": ["workflow_run/r1", "workflow_run/r2"]})
        );

        hub.handle_message("workflow_run/r1", r#"{"n":3}"#).await;
        assert_eq!(rx.try_recv().unwrap(), Ping { n: 3 });
        assert!(rx.try_recv().is_err());
    }
}
