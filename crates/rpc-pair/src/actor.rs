//! The local side of an actor: any object a [`crate::ActorRegistry`] can expose
//! under an id, reachable remotely through `callActor`/`-getActorProperty-`.

use crate::emitter::Emitter;
use crate::error::RpcError;
use crate::pair::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// A local, stateful, event-emitting object addressable by a string id.
///
/// Default method/property lookups report "no such method"/`null` so a type
/// implementing only the capabilities it actually has (methods, properties,
/// publishing) does not need to stub out the rest.
pub trait Actor: Send + Sync {
    /// Invokes `method` with positional `args`, returning the JSON result.
    /// The default rejects every method name; actors exposing callable
    /// methods override this.
    fn call(&self, method: &str, args: Vec<Value>) -> BoxFuture {
        let method = method.to_string();
        Box::pin(async move {
            Err(RpcError::ActorNoSuchMethod {
                method,
                available: Vec::new(),
            })
        })
    }

    /// The names of methods `call` accepts, reported on
    /// `RpcError::ActorNoSuchMethod` so a caller can see what is available.
    fn method_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Reads an enumerable property by name. The default returns `Value::Null`
    /// for any name, matching "return the requested property as-is" with no
    /// declared properties.
    fn get_property(&self, _name: &str) -> Value {
        Value::Null
    }

    /// The actor's own event emitter, if it publishes events. `None` means
    /// the actor never emits and the registry skips publish-wrapping.
    fn events(&self) -> Option<&Emitter> {
        None
    }
}

/// Wraps a plain async closure into an [`Actor`] whose only capability is a
/// single callable method — convenient for tests and simple actors that do
/// not need properties or events.
pub fn method_actor<F, Fut>(name: impl Into<String>, f: F) -> SingleMethodActor
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, RpcError>> + Send + 'static,
{
    SingleMethodActor {
        name: name.into(),
        handler: Arc::new(move |args| Box::pin(f(args)) as BoxFuture),
    }
}

type MethodFn = Arc<dyn Fn(Vec<Value>) -> BoxFuture + Send + Sync>;

/// An [`Actor`] exposing exactly one callable method. Built with [`method_actor`].
pub struct SingleMethodActor {
    name: String,
    handler: MethodFn,
}

impl Actor for SingleMethodActor {
    fn call(&self, method: &str, args: Vec<Value>) -> BoxFuture {
        if method == self.name {
            (self.handler)(args)
        } else {
            let method = method.to_string();
            let available = vec![self.name.clone()];
            Box::pin(async move { Err(RpcError::ActorNoSuchMethod { method, available }) })
        }
    }

    fn method_names(&self) -> Vec<String> {
        vec![self.name.clone()]
    }
}
