//! The actor registry overlay: late-binding name resolution, per-actor event
//! scoping, property access, and expiry, attached to at most one [`Pair`].

use crate::actor::Actor;
use crate::emitter::Emitter;
use crate::error::RpcError;
use crate::pair::{handler, Pair};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::oneshot;

/// How long `callActor`/`getActorProperty` wait for a not-yet-registered id
/// before failing with [`RpcError::ActorRegistrationTimeout`].
pub const REGISTRATION_TIMEOUT: Duration = Duration::from_millis(500);

/// How long an actor method invocation is given to settle before
/// [`RpcError::ActorCallTimeout`].
pub const ACTOR_CALL_TIMEOUT: Duration = Duration::from_millis(500);

/// Reserved method name the registry installs for remote actor method calls.
pub const CALL_ACTOR_METHOD: &str = "callActor";

/// Reserved method name the registry installs for remote property reads.
/// Chosen to be unlikely to collide with a user's own exposed method names;
/// if it does anyway, the registry wins silently.
pub const GET_ACTOR_PROPERTY_METHOD: &str = "-getActorProperty-";

/// Formats the wire-level scoped event name an actor's event `event` is
/// delivered under for actor `id`: `"remote:<id>:<event>"`.
pub fn scoped_event_name(id: &str, event: &str) -> String {
    format!("remote:{id}:{event}")
}

enum Slot {
    Present(Arc<dyn Actor>),
    Expired,
}

/// Maps actor ids to actors, proxies their events onto the owning [`Pair`]
/// under a scoped name, and tracks expiry. At most one registry may be
/// `expose`d on a given `Pair`.
pub struct ActorRegistry {
    slots: Mutex<HashMap<String, Slot>>,
    /// Fires `register:<id>` / `deregister:<id>` so `wait_for_actor` can
    /// resolve a `callActor` that races a late `exposeActor`.
    transitions: Emitter,
    live_flags: Mutex<HashMap<String, Arc<AtomicBool>>>,
    pair: OnceLock<Arc<Pair>>,
}

impl Default for ActorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorRegistry {
    pub fn new() -> Self {
        ActorRegistry {
            slots: Mutex::new(HashMap::new()),
            transitions: Emitter::new(),
            live_flags: Mutex::new(HashMap::new()),
            pair: OnceLock::new(),
        }
    }

    /// Installs the two reserved methods on `pair` and attaches this registry
    /// to it. Fails if `pair` already has a registry attached.
    pub fn expose(self: &Arc<Self>, pair: &Arc<Pair>) -> Result<(), RpcError> {
        pair.attach_registry(self.clone())?;
        self.pair
            .set(pair.clone())
            .unwrap_or_else(|_| panic!("ActorRegistry::expose called on more than one pair"));

        let call_registry = self.clone();
        pair.expose(
            CALL_ACTOR_METHOD,
            handler(move |params| {
                let registry = call_registry.clone();
                async move { registry.handle_call_actor(params).await }
            }),
        );

        let prop_registry = self.clone();
        pair.expose(
            GET_ACTOR_PROPERTY_METHOD,
            handler(move |params| {
                let registry = prop_registry.clone();
                async move { registry.handle_get_actor_property(params).await }
            }),
        );

        Ok(())
    }

    /// Returns the actor currently registered under `id`, or `None` if it
    /// was never registered or has since expired.
    pub fn get_local(&self, id: &str) -> Option<Arc<dyn Actor>> {
        match self.slots.lock().get(id) {
            Some(Slot::Present(actor)) => Some(actor.clone()),
            Some(Slot::Expired) | None => None,
        }
    }

    /// Registers `actor` under `id`. Fails with [`RpcError::DuplicateActorId`]
    /// if `id` is already occupied, including by an expired slot — ids never
    /// come back to life within a registry's lifetime.
    pub fn expose_actor(
        self: &Arc<Self>,
        id: impl Into<String>,
        actor: Arc<dyn Actor>,
    ) -> Result<(), RpcError> {
        let id = id.into();
        {
            let mut slots = self.slots.lock();
            if slots.contains_key(&id) {
                return Err(RpcError::DuplicateActorId { id });
            }
            slots.insert(id.clone(), Slot::Present(actor.clone()));
        }

        if let Some(events) = actor.events() {
            let live = Arc::new(AtomicBool::new(true));
            self.live_flags.lock().insert(id.clone(), live.clone());
            let registry = self.clone();
            let proxied_id = id.clone();
            events.on_any(move |event, data| {
                if live.load(Ordering::Acquire) {
                    registry.proxy_actor_event(&proxied_id, event, data);
                }
            });
        }

        self.transitions.emit(&format!("register:{id}"), &[]);
        Ok(())
    }

    /// Marks `id` expired. Subsequent `callActor`/`getActorProperty` targeting
    /// it fail with [`RpcError::ActorExpired`]; the id can never be
    /// re-registered. Publish-wrapping is stopped by flipping the stored
    /// "still live" flag rather than unsubscribing, so a concurrent publish
    /// racing the expiry is simply dropped instead of tearing down a listener
    /// another client might still be relying on.
    pub fn expire_actor(&self, id: &str) {
        self.slots.lock().insert(id.to_string(), Slot::Expired);
        if let Some(live) = self.live_flags.lock().get(id) {
            live.store(false, Ordering::Release);
        }
        self.transitions.emit(&format!("deregister:{id}"), &[]);
    }

    /// Proxies one actor publish onto the owning pair as a scoped `notify`,
    /// so a `RemoteActor` on the other side of the pair sees it as
    /// `"remote:<id>:<event>"`. Fire-and-forget: the emit's acknowledgement
    /// failing (peer gone, timeout) is not the publishing actor's problem,
    /// so it is only traced, never propagated.
    fn proxy_actor_event(self: &Arc<Self>, id: &str, event: &str, data: &[Value]) {
        let Some(pair) = self.pair.get().cloned() else {
            return;
        };
        let scoped = scoped_event_name(id, event);
        let data = data.to_vec();
        tokio::spawn(async move {
            if let Err(err) = pair.emit(&scoped, data).await {
                tracing::warn!(event = %scoped, error = %err, "actor event emit did not get acknowledged");
            }
        });
    }

    async fn wait_for_actor(
        self: &Arc<Self>,
        id: &str,
        timeout: Duration,
    ) -> Result<Arc<dyn Actor>, RpcError> {
        if let Some(err) = self.expired_error(id) {
            return Err(err);
        }
        if let Some(actor) = self.get_local(id) {
            return Ok(actor);
        }

        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let event_name = format!("register:{id}");
        let listener_id = self.transitions.once(event_name.clone(), move |_| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(());
            }
        });

        // Re-check after subscribing: registration may have raced us between
        // the first check above and `once` taking the listener-table lock.
        if let Some(actor) = self.get_local(id) {
            self.transitions.off(&event_name, listener_id);
            return Ok(actor);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(_) => self
                .get_local(id)
                .ok_or_else(|| RpcError::ActorRegistrationTimeout { id: id.to_string() }),
            Err(_) => {
                self.transitions.off(&event_name, listener_id);
                Err(RpcError::ActorRegistrationTimeout { id: id.to_string() })
            }
        }
    }

    fn expired_error(&self, id: &str) -> Option<RpcError> {
        match self.slots.lock().get(id) {
            Some(Slot::Expired) => Some(RpcError::ActorExpired { id: id.to_string() }),
            _ => None,
        }
    }

    async fn handle_call_actor(self: Arc<Self>, mut params: Vec<Value>) -> Result<Value, RpcError> {
        if params.len() < 2 {
            return Err(RpcError::ActorNoSuchMethod {
                method: String::new(),
                available: Vec::new(),
            });
        }
        let args = params.split_off(2);
        let method = params
            .pop()
            .unwrap()
            .as_str()
            .unwrap_or_default()
            .to_string();
        let id = params
            .pop()
            .unwrap()
            .as_str()
            .unwrap_or_default()
            .to_string();

        let actor = self.wait_for_actor(&id, REGISTRATION_TIMEOUT).await?;
        match tokio::time::timeout(ACTOR_CALL_TIMEOUT, actor.call(&method, args)).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::ActorCallTimeout { id, method }),
        }
    }

    async fn handle_get_actor_property(
        self: Arc<Self>,
        mut params: Vec<Value>,
    ) -> Result<Value, RpcError> {
        if params.len() < 2 {
            return Err(RpcError::ActorNoSuchMethod {
                method: String::new(),
                available: Vec::new(),
            });
        }
        let name = params
            .pop()
            .unwrap()
            .as_str()
            .unwrap_or_default()
            .to_string();
        let id = params
            .pop()
            .unwrap()
            .as_str()
            .unwrap_or_default()
            .to_string();
        let actor = self.wait_for_actor(&id, REGISTRATION_TIMEOUT).await?;
        Ok(actor.get_property(&name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::Emitter as ActorEmitter;
    use crate::error::RpcError;
    use serde_json::json;
    use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
    use std::sync::Arc;

    struct Incrementer {
        value: AtomicI64,
        events: ActorEmitter,
    }

    impl Actor for Incrementer {
        fn call(&self, method: &str, _args: Vec<Value>) -> crate::pair::BoxFuture {
            let result = match method {
                "increment" => {
                    let v = self.value.fetch_add(1, AtomicOrdering::SeqCst) + 1;
                    Ok(Value::from(v))
                }
                other => Err(RpcError::ActorNoSuchMethod {
                    method: other.to_string(),
                    available: vec!["increment".to_string()],
                }),
            };
            Box::pin(async move { result })
        }

        fn method_names(&self) -> Vec<String> {
            vec!["increment".to_string()]
        }

        fn get_property(&self, name: &str) -> Value {
            if name == "name" {
                Value::from("I am an ACTOR")
            } else {
                Value::Null
            }
        }

        fn events(&self) -> Option<&ActorEmitter> {
            Some(&self.events)
        }
    }

    fn silent_sink() -> impl Fn(RpcError) + Send + Sync + 'static {
        |err| panic!("unexpected error routed to sink: {err}")
    }

    #[tokio::test]
    async fn call_actor_increments_and_persists_state() {
        let pair = Pair::builder()
            .name("left")
            .error_sink(silent_sink())
            .build()
            .unwrap();
        pair.set_send(|_| Ok(()));
        let registry = Arc::new(ActorRegistry::new());
        registry.clone().expose(&pair).unwrap();

        let actor = Arc::new(Incrementer {
            value: AtomicI64::new(0),
            events: ActorEmitter::new(),
        });
        registry.expose_actor("incrementer-1", actor).unwrap();

        let first = registry
            .clone()
            .handle_call_actor(vec![
                json!("incrementer-1"),
                json!("increment"),
            ])
            .await
            .unwrap();
        assert_eq!(first, json!(1));

        let second = registry
            .clone()
            .handle_call_actor(vec![json!("incrementer-1"), json!("increment")])
            .await
            .unwrap();
        assert_eq!(second, json!(2));
    }

    #[tokio::test]
    async fn get_property_returns_actor_field() {
        let pair = Pair::builder()
            .name("left")
            .error_sink(silent_sink())
            .build()
            .unwrap();
        pair.set_send(|_| Ok(()));
        let registry = Arc::new(ActorRegistry::new());
        registry.clone().expose(&pair).unwrap();
        registry
            .expose_actor(
                "incrementer-1",
                Arc::new(Incrementer {
                    value: AtomicI64::new(0),
                    events: ActorEmitter::new(),
                }),
            )
            .unwrap();

        let name = registry
            .clone()
            .handle_get_actor_property(vec![json!("incrementer-1"), json!("name")])
            .await
            .unwrap();
        assert_eq!(name, json!("I am an ACTOR"));
    }

    #[tokio::test]
    async fn call_actor_rejects_unknown_method() {
        let pair = Pair::builder()
            .name("left")
            .error_sink(silent_sink())
            .build()
            .unwrap();
        pair.set_send(|_| Ok(()));
        let registry = Arc::new(ActorRegistry::new());
        registry.clone().expose(&pair).unwrap();
        registry
            .expose_actor(
                "x",
                Arc::new(Incrementer {
                    value: AtomicI64::new(0),
                    events: ActorEmitter::new(),
                }),
            )
            .unwrap();

        let err = registry
            .clone()
            .handle_call_actor(vec![json!("x"), json!("blah")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("NoSuchMethod"));
    }

    #[tokio::test]
    async fn duplicate_expose_actor_fails() {
        let registry = Arc::new(ActorRegistry::new());
        let actor = || {
            Arc::new(Incrementer {
                value: AtomicI64::new(0),
                events: ActorEmitter::new(),
            })
        };
        registry.expose_actor("a", actor()).unwrap();
        let err = registry.expose_actor("a", actor()).unwrap_err();
        assert!(err.to_string().to_lowercase().contains("duplicate"));
    }

    #[tokio::test]
    async fn expired_actor_rejects_calls() {
        let registry = Arc::new(ActorRegistry::new());
        registry
            .expose_actor(
                "a",
                Arc::new(Incrementer {
                    value: AtomicI64::new(0),
                    events: ActorEmitter::new(),
                }),
            )
            .unwrap();
        registry.expire_actor("a");

        let err = registry
            .clone()
            .handle_call_actor(vec![json!("a"), json!("increment")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Expired"));

        let err2 = registry.expose_actor(
            "a",
            Arc::new(Incrementer {
                value: AtomicI64::new(0),
                events: ActorEmitter::new(),
            }),
        );
        assert!(matches!(err2, Err(RpcError::DuplicateActorId { .. })));
    }

    #[tokio::test]
    async fn late_registration_resolves_within_timeout() {
        let registry = Arc::new(ActorRegistry::new());
        let registry2 = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            registry2
                .expose_actor(
                    "late",
                    Arc::new(Incrementer {
                        value: AtomicI64::new(0),
                        events: ActorEmitter::new(),
                    }),
                )
                .unwrap();
        });

        let result = registry
            .clone()
            .handle_call_actor(vec![json!("late"), json!("increment")])
            .await
            .unwrap();
        assert_eq!(result, json!(1));
    }

    #[tokio::test]
    async fn registration_timeout_fires_when_nobody_registers() {
        let registry = Arc::new(ActorRegistry::new());
        let err = registry
            .clone()
            .wait_for_actor("ghost", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::ActorRegistrationTimeout { .. }));
    }

    #[test]
    fn scoped_event_name_matches_spec_format() {
        assert_eq!(scoped_event_name("a", "tick"), "remote:a:tick");
    }
}
