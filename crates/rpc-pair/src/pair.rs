//! The core of an RPC pair: expose/call/emit/on, correlation, and timeouts.

use crate::emitter::{Emitter, ListenerId};
use crate::error::RpcError;
use crate::id;
use crate::message::{err_result, ok_result, CallMessage, Message, NotifyMessage};
use crate::registry::ActorRegistry;
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// The boxed future every exposed method handler and every [`crate::Actor`]
/// method/call returns — `Actor` is a public trait, so this alias must be
/// public too, not merely crate-visible.
pub type BoxFuture = Pin<Box<dyn Future<Output = Result<Value, RpcError>> + Send>>;

/// A method handler: takes the call's positional params, returns a boxed future.
pub type Handler = Arc<dyn Fn(Vec<Value>) -> BoxFuture + Send + Sync>;

/// Wraps a plain async closure into a [`Handler`], so [`Pair::expose_many`]
/// can accept a homogeneous collection of already-boxed entries.
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, RpcError>> + Send + 'static,
{
    Arc::new(move |params| Box::pin(f(params)) as BoxFuture)
}

type SendFn = Box<dyn FnMut(Message) -> Result<(), RpcError> + Send>;
type ErrorSink = Arc<dyn Fn(RpcError) + Send + Sync>;
type EffectsWrapper = Arc<dyn Fn(Box<dyn FnOnce() + Send>) + Send + Sync>;

const DEFAULT_TIMEOUT_MS: u64 = 500;

/// A transport-agnostic, promise-oriented RPC endpoint. Two `Pair`s, one per
/// side, connected by any full-duplex transport, form one logical pair.
pub struct Pair {
    name: String,
    error_sink: ErrorSink,
    call_timeout: Duration,
    emit_timeout: Duration,
    wrap_effects: EffectsWrapper,
    send: Mutex<Option<SendFn>>,
    methods: Mutex<HashMap<String, Handler>>,
    waiters: Mutex<HashMap<String, oneshot::Sender<Result<Value, RpcError>>>>,
    emitter: Emitter,
    registry: Mutex<Option<Arc<ActorRegistry>>>,
}

/// Builder for [`Pair`]. `name` and `error_sink` are mandatory; everything
/// else defaults (500ms call/emit timeouts, a no-op effects wrapper).
pub struct PairBuilder {
    name: Option<String>,
    error_sink: Option<ErrorSink>,
    call_timeout: Duration,
    emit_timeout: Duration,
    wrap_effects: EffectsWrapper,
}

impl Default for PairBuilder {
    fn default() -> Self {
        PairBuilder {
            name: None,
            error_sink: None,
            call_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            emit_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            wrap_effects: Arc::new(|f| f()),
        }
    }
}

impl PairBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn error_sink(mut self, sink: impl Fn(RpcError) + Send + Sync + 'static) -> Self {
        self.error_sink = Some(Arc::new(sink));
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn emit_timeout(mut self, timeout: Duration) -> Self {
        self.emit_timeout = timeout;
        self
    }

    pub fn wrap_effects(
        mut self,
        wrapper: impl Fn(Box<dyn FnOnce() + Send>) + Send + Sync + 'static,
    ) -> Self {
        self.wrap_effects = Arc::new(wrapper);
        self
    }

    pub fn build(self) -> Result<Arc<Pair>, RpcError> {
        let name = self.name.ok_or(RpcError::MissingName)?;
        if name.is_empty() {
            return Err(RpcError::MissingName);
        }
        let error_sink = self.error_sink.ok_or(RpcError::MissingErrorHandler)?;
        Ok(Arc::new(Pair {
            name,
            error_sink,
            call_timeout: self.call_timeout,
            emit_timeout: self.emit_timeout,
            wrap_effects: self.wrap_effects,
            send: Mutex::new(None),
            methods: Mutex::new(HashMap::new()),
            waiters: Mutex::new(HashMap::new()),
            emitter: Emitter::new(),
            registry: Mutex::new(None),
        }))
    }
}

impl Pair {
    pub fn builder() -> PairBuilder {
        PairBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a single method handler, replacing any prior handler of the
    /// same name.
    pub fn expose(&self, name: impl Into<String>, handler: Handler) {
        self.methods.lock().insert(name.into(), handler);
    }

    /// Registers every `(name, handler)` pair, the map form of [`Pair::expose`].
    pub fn expose_many(&self, handlers: impl IntoIterator<Item = (String, Handler)>) {
        let mut methods = self.methods.lock();
        for (name, handler) in handlers {
            methods.insert(name, handler);
        }
    }

    /// Installs (or replaces) the function used to write outbound messages.
    /// Calls/emits made before this is installed fail with
    /// [`RpcError::MissingSendFunction`]; a replacement mid-flight is a
    /// best-effort reconnect — in-flight waiters are unaffected.
    pub fn set_send(&self, send: impl FnMut(Message) -> Result<(), RpcError> + Send + 'static) {
        *self.send.lock() = Some(Box::new(send));
    }

    pub fn clear_send(&self) {
        *self.send.lock() = None;
    }

    fn raw_send(&self, message: &Message) -> Result<(), RpcError> {
        let mut guard = self.send.lock();
        match guard.as_mut() {
            Some(send) => send(message.clone()),
            None => Err(RpcError::MissingSendFunction),
        }
    }

    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        self.call_with_timeout(method, params, self.call_timeout)
            .await
    }

    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value, RpcError> {
        let id = id::format(&self.name);
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(id.clone(), tx);

        let message = Message::Call(CallMessage {
            id: id.clone(),
            method: method.to_string(),
            params,
        });
        if let Err(err) = self.raw_send(&message) {
            self.waiters.lock().remove(&id);
            return Err(err);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RpcError::Transport(
                "pair dropped while awaiting call result".into(),
            )),
            Err(_) => {
                self.waiters.lock().remove(&id);
                Err(RpcError::Timeout(format!(
                    "timed out waiting for result of \"{method}\" after {}ms",
                    timeout.as_millis()
                )))
            }
        }
    }

    pub async fn emit(&self, event: &str, data: Vec<Value>) -> Result<(), RpcError> {
        self.emit_with_timeout(event, data, self.emit_timeout).await
    }

    pub async fn emit_with_timeout(
        &self,
        event: &str,
        data: Vec<Value>,
        timeout: Duration,
    ) -> Result<(), RpcError> {
        let id = id::format(&self.name);
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(id.clone(), tx);

        let message = Message::Notify(NotifyMessage {
            id: id.clone(),
            event: event.to_string(),
            data,
        });
        if let Err(err) = self.raw_send(&message) {
            self.waiters.lock().remove(&id);
            return Err(err);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(_))) => Ok(()),
            Ok(Ok(Err(err))) => Err(err),
            Ok(Err(_)) => Err(RpcError::Transport(
                "pair dropped while awaiting emit acknowledgement".into(),
            )),
            Err(_) => {
                self.waiters.lock().remove(&id);
                Err(RpcError::TimeoutWaitingForWriteAck {
                    id,
                    kind: "notify",
                    duration_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    pub fn on(&self, event: impl Into<String>, listener: impl Fn(&[Value]) + Send + Sync + 'static) -> ListenerId {
        self.emitter.on(event, listener)
    }

    pub fn once(&self, event: impl Into<String>, listener: impl Fn(&[Value]) + Send + Sync + 'static) -> ListenerId {
        self.emitter.once(event, listener)
    }

    pub fn off(&self, event: &str, id: ListenerId) {
        self.emitter.off(event, id);
    }

    pub fn remove_listener(&self, event: &str) {
        self.emitter.remove_all(event);
    }

    pub(crate) fn attach_registry(&self, registry: Arc<ActorRegistry>) -> Result<(), RpcError> {
        let mut slot = self.registry.lock();
        if slot.is_some() {
            return Err(RpcError::RegistryAlreadyExposed);
        }
        *slot = Some(registry);
        Ok(())
    }

    fn report(&self, err: RpcError) {
        (self.error_sink)(err);
    }

    fn registry(&self) -> Result<Arc<ActorRegistry>, RpcError> {
        self.registry
            .lock()
            .clone()
            .ok_or_else(|| RpcError::Transport("no actor registry attached to pair".into()))
    }

    /// Returns the actor currently registered under `id` on this pair's
    /// attached registry, or `None` if there is no registry, no such id, or
    /// the id has expired.
    pub fn get_local_actor(&self, id: &str) -> Option<Arc<dyn crate::actor::Actor>> {
        self.registry.lock().as_ref()?.get_local(id)
    }

    /// Registers `actor` under `id` on this pair's attached registry.
    pub fn expose_actor(
        &self,
        id: impl Into<String>,
        actor: Arc<dyn crate::actor::Actor>,
    ) -> Result<(), RpcError> {
        self.registry()?.expose_actor(id, actor)
    }

    /// Expires `id` on this pair's attached registry.
    pub fn expire_actor(&self, id: &str) -> Result<(), RpcError> {
        self.registry()?.expire_actor(id);
        Ok(())
    }

    /// Binds a client-side [`crate::RemoteActor`] handle to `id`, the Rust
    /// equivalent of the `actors.mixin(pair)`-installed `getActor` shortcut.
    pub fn get_actor(self: &Arc<Self>, id: impl Into<String>) -> crate::remote_actor::RemoteActor {
        crate::remote_actor::RemoteActor::new(self.clone(), id.into())
    }

    /// Synchronous dispatch entry point: decodes which of `call`/`notify`/
    /// `result` the message is and routes it. Never awaits handler
    /// completion itself — that work is spawned so the transport's read loop
    /// is never blocked on user code.
    pub fn incoming(self: &Arc<Self>, message: Message) {
        match message {
            Message::Call(call) => self.handle_call(call),
            Message::Notify(notify) => self.handle_notify(notify),
            Message::Result(result) => self.handle_result(result),
        }
    }

    fn handle_call(self: &Arc<Self>, call: CallMessage) {
        let handler = self.methods.lock().get(&call.method).cloned();
        let Some(handler) = handler else {
            let err = RpcError::NoSuchMethod {
                method: call.method,
                params: call.params,
            };
            let reply = err_result(call.id, &err);
            if let Err(send_err) = self.raw_send(&reply) {
                self.report(send_err);
            }
            return;
        };

        let pair = self.clone();
        let id = call.id;
        tokio::spawn(async move {
            let outcome = std::panic::AssertUnwindSafe(handler(call.params))
                .catch_unwind()
                .await;
            let reply = match outcome {
                Ok(Ok(value)) => ok_result(id, value),
                Ok(Err(err)) => err_result(id, &err),
                Err(_) => err_result(
                    id,
                    &RpcError::Transport("exposed method handler panicked".into()),
                ),
            };
            if let Err(send_err) = pair.raw_send(&reply) {
                pair.report(send_err);
            }
        });
    }

    fn handle_notify(self: &Arc<Self>, notify: NotifyMessage) {
        let ack = ok_result(notify.id.clone(), Value::Null);
        if let Err(send_err) = self.raw_send(&ack) {
            self.report(send_err);
        }

        let pair = self.clone();
        let event = notify.event;
        let data = notify.data;
        (self.wrap_effects.clone())(Box::new(move || {
            pair.emitter.emit(&event, &data);
        }));
    }

    fn handle_result(&self, result: crate::message::ResultMessage) {
        let waiter = self.waiters.lock().remove(&result.id);
        let Some(waiter) = waiter else {
            self.report(RpcError::UnmatchedResult { id: result.id });
            return;
        };

        // `result: None` means either the field was absent or, since JSON
        // `null` always decodes `Option<T>` to `None`, that it was
        // literally `null` — a legitimate result, not a missing one. Only a
        // present `error` turns this into a rejection.
        let outcome = match result.error {
            Some(error) => Err(crate::message::NormalizedError::from_wire(error).into_rpc_error()),
            None => Ok(result.result.unwrap_or(Value::Null)),
        };

        let _ = waiter.send(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ResultMessage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn silent_sink() -> impl Fn(RpcError) + Send + Sync + 'static {
        |err| panic!("unexpected error routed to sink: {err}")
    }

    #[tokio::test]
    async fn call_resolves_once_result_arrives() {
        let pair = Pair::builder()
            .name("left")
            .error_sink(silent_sink())
            .build()
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        pair.set_send(move |msg| {
            tx.send(msg).ok();
            Ok(())
        });

        let pair2 = pair.clone();
        tokio::spawn(async move {
            let sent = rx.recv().await.unwrap();
            let id = sent.id().to_string();
            pair2.incoming(Message::Result(ResultMessage {
                id,
                result: Some(Value::from(15)),
                error: None,
            }));
        });

        let result = pair
            .call("add", vec![Value::from(10), Value::from(5)])
            .await
            .unwrap();
        assert_eq!(result, Value::from(15));
    }

    #[tokio::test]
    async fn null_result_resolves_rather_than_rejecting() {
        let pair = Pair::builder()
            .name("left")
            .error_sink(silent_sink())
            .build()
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        pair.set_send(move |msg| {
            tx.send(msg).ok();
            Ok(())
        });

        let pair2 = pair.clone();
        tokio::spawn(async move {
            let sent = rx.recv().await.unwrap();
            let id = sent.id().to_string();
            // Round-trips through JSON exactly as a wire transport would,
            // so `result: null` decodes to `result: None` just like an
            // absent field does.
            let json = serde_json::to_string(&ok_result(id, Value::Null)).unwrap();
            let decoded: Message = serde_json::from_str(&json).unwrap();
            pair2.incoming(decoded);
        });

        let result = pair.call("echo", vec![Value::Null]).await.unwrap();
        assert_eq!(result, Value::Null);
    }

    #[tokio::test]
    async fn emit_ack_resolves_after_round_tripping_through_json() {
        let pair = Pair::builder()
            .name("left")
            .error_sink(silent_sink())
            .build()
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        pair.set_send(move |msg| {
            tx.send(msg).ok();
            Ok(())
        });

        let pair2 = pair.clone();
        tokio::spawn(async move {
            let sent = rx.recv().await.unwrap();
            let id = sent.id().to_string();
            let json = serde_json::to_string(&ok_result(id, Value::Null)).unwrap();
            let decoded: Message = serde_json::from_str(&json).unwrap();
            pair2.incoming(decoded);
        });

        pair.emit("hi", vec![]).await.unwrap();
    }

    #[tokio::test]
    async fn call_times_out_when_no_result_arrives() {
        let pair = Pair::builder()
            .name("left")
            .error_sink(silent_sink())
            .call_timeout(Duration::from_millis(20))
            .build()
            .unwrap();
        pair.set_send(|_| Ok(()));

        let err = pair.call("add", vec![]).await.unwrap_err();
        assert!(err.to_string().contains("Timeout"));
    }

    #[tokio::test]
    async fn call_without_send_function_fails_fast() {
        let pair = Pair::builder()
            .name("left")
            .error_sink(silent_sink())
            .build()
            .unwrap();
        let err = pair.call("add", vec![]).await.unwrap_err();
        assert!(matches!(err, RpcError::MissingSendFunction));
    }

    #[tokio::test]
    async fn exposed_method_replies_with_handler_result() {
        let pair = Pair::builder()
            .name("left")
            .error_sink(silent_sink())
            .build()
            .unwrap();
        pair.expose(
            "add",
            handler(|params| async move {
                let a = params[0].as_i64().unwrap_or(0);
                let b = params[1].as_i64().unwrap_or(0);
                Ok(Value::from(a + b))
            }),
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        pair.set_send(move |msg| {
            tx.send(msg).ok();
            Ok(())
        });

        pair.incoming(Message::Call(CallMessage {
            id: "right:1".into(),
            method: "add".into(),
            params: vec![Value::from(10), Value::from(5)],
        }));

        let reply = rx.recv().await.unwrap();
        match reply {
            Message::Result(r) => assert_eq!(r.result, Some(Value::from(15))),
            _ => panic!("expected a result message"),
        }
    }

    #[tokio::test]
    async fn unknown_method_replies_with_no_such_method() {
        let pair = Pair::builder()
            .name("left")
            .error_sink(silent_sink())
            .build()
            .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        pair.set_send(move |msg| {
            tx.send(msg).ok();
            Ok(())
        });

        pair.incoming(Message::Call(CallMessage {
            id: "right:1".into(),
            method: "missing".into(),
            params: vec![],
        }));

        let reply = rx.recv().await.unwrap();
        match reply {
            Message::Result(r) => {
                let error = crate::message::NormalizedError::from_wire(r.error.unwrap());
                assert!(error.message.contains("NoSuchMethod"));
            }
            _ => panic!("expected a result message"),
        }
    }

    #[tokio::test]
    async fn notify_acks_before_delivering_to_local_listeners() {
        let pair = Pair::builder()
            .name("left")
            .error_sink(silent_sink())
            .build()
            .unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        let order_send = order.clone();
        pair.set_send(move |msg| {
            if let Message::Result(_) = &msg {
                order_send.lock().push("ack");
            }
            Ok(())
        });

        let order_listener = order.clone();
        pair.on("tick", move |_| {
            order_listener.lock().push("listener");
        });

        pair.incoming(Message::Notify(NotifyMessage {
            id: "right:1".into(),
            event: "tick".into(),
            data: vec![],
        }));

        assert_eq!(*order.lock(), vec!["ack", "listener"]);
    }

    #[tokio::test]
    async fn unmatched_result_is_routed_to_error_sink() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        let pair = Pair::builder()
            .name("left")
            .error_sink(move |err| {
                assert!(matches!(err, RpcError::UnmatchedResult { .. }));
                seen2.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        pair.incoming(Message::Result(ResultMessage {
            id: "left:999".into(),
            result: Some(Value::Null),
            error: None,
        }));

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
