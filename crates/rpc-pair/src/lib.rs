//! rpc-pair: a transport-agnostic, promise-oriented RPC library connecting
//! two peers — a *pair* — over any full-duplex message channel.
//!
//! Each peer can simultaneously expose methods, call methods on its partner,
//! emit events to its partner, and host or address *actors* (identified,
//! stateful, event-emitting objects reachable by a string id). The crate is
//! deliberately small: a [`Pair`] correlates `call`/`notify`/`result` frames
//! over whatever [`transport::Transport`] you attach, and an
//! [`ActorRegistry`] layers late-binding, event-scoped actor addressing on
//! top of it.
//!
//! # Example
//!
//! ```no_run
//! use rpc_pair::{handler, transport, transport::Transport, Pair};
//! use serde_json::Value;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let left = Pair::builder()
//!     .name("left")
//!     .error_sink(|err| eprintln!("pair error: {err}"))
//!     .build()
//!     .unwrap();
//! let right = Pair::builder()
//!     .name("right")
//!     .error_sink(|err| eprintln!("pair error: {err}"))
//!     .build()
//!     .unwrap();
//!
//! right.expose(
//!     "add",
//!     handler(|params| async move {
//!         let a = params[0].as_i64().unwrap_or(0);
//!         let b = params[1].as_i64().unwrap_or(0);
//!         Ok(Value::from(a + b))
//!     }),
//! );
//!
//! let (left_transport, right_transport) = transport::duplex();
//! let _left_handle = left_transport.attach(&left);
//! let _right_handle = right_transport.attach(&right);
//!
//! let sum = left.call("add", vec![Value::from(10), Value::from(5)]).await.unwrap();
//! assert_eq!(sum, Value::from(15));
//! # }
//! ```

pub mod actor;
pub mod emitter;
pub mod error;
mod id;
pub mod message;
pub mod pair;
pub mod registry;
pub mod remote_actor;
pub mod transport;

pub use actor::{method_actor, Actor, SingleMethodActor};
pub use emitter::{Emitter, ListenerId};
pub use error::{Result, RpcError};
pub use message::{CallMessage, Message, NormalizedError, NotifyMessage, ResultMessage};
pub use pair::{handler, Handler, Pair, PairBuilder};
pub use registry::{
    ActorRegistry, ACTOR_CALL_TIMEOUT, CALL_ACTOR_METHOD, GET_ACTOR_PROPERTY_METHOD,
    REGISTRATION_TIMEOUT,
};
pub use remote_actor::RemoteActor;
