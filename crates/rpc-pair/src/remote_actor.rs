//! The client-side binding over a [`Pair`] for one actor id — holds no state
//! of its own; every operation reduces to a `Pair` call or a subscription to
//! a scoped event name on the pair's local emitter.

use crate::emitter::ListenerId;
use crate::error::RpcError;
use crate::pair::Pair;
use crate::registry::{scoped_event_name, CALL_ACTOR_METHOD, GET_ACTOR_PROPERTY_METHOD};
use serde_json::Value;
use std::sync::Arc;

/// A handle bound to `(pair, id)`: a thin typed proxy scoped to one remote
/// actor id, calling through the registry's two reserved methods instead of
/// a bespoke per-type method set.
#[derive(Clone)]
pub struct RemoteActor {
    pair: Arc<Pair>,
    id: String,
}

impl RemoteActor {
    pub fn new(pair: Arc<Pair>, id: String) -> Self {
        RemoteActor { pair, id }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// `.call(method, args)` → `pair.call("callActor", id, method, ...args)`.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, RpcError> {
        let mut params = vec![Value::from(self.id.clone()), Value::from(method)];
        params.extend(args);
        self.pair.call(CALL_ACTOR_METHOD, params).await
    }

    /// `.get(name)` → `pair.call("-getActorProperty-", id, name)`.
    pub async fn get(&self, name: &str) -> Result<Value, RpcError> {
        let params = vec![Value::from(self.id.clone()), Value::from(name)];
        self.pair.call(GET_ACTOR_PROPERTY_METHOD, params).await
    }

    /// Subscribes to actor event `event` as delivered under the scoped wire
    /// name `"remote:<id>:<event>"` on the underlying pair.
    pub fn on(
        &self,
        event: &str,
        listener: impl Fn(&[Value]) + Send + Sync + 'static,
    ) -> ListenerId {
        self.pair.on(scoped_event_name(&self.id, event), listener)
    }

    pub fn once(
        &self,
        event: &str,
        listener: impl Fn(&[Value]) + Send + Sync + 'static,
    ) -> ListenerId {
        self.pair.once(scoped_event_name(&self.id, event), listener)
    }

    pub fn off(&self, event: &str, listener_id: ListenerId) {
        self.pair.off(&scoped_event_name(&self.id, event), listener_id);
    }

    pub fn remove_listener(&self, event: &str) {
        self.pair.remove_listener(&scoped_event_name(&self.id, event));
    }
}
