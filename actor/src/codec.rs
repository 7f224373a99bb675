// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Codec
//!
//! Type-tagged serialization of user messages. Every type that may cross a worker boundary
//! is registered once, at start-up, under a stable tag; the tag travels next to the payload
//! so the receiving worker can pick the matching decoder. Payloads are `bincode`.
//!
//! Actor references are never serialized as such: they travel as globalized paths and are
//! resolved again by the receiving worker.
//!

use crate::{
    ActorPath, ActorRef, Error, WorkerAddress,
    message::{
        ActorIdentity, AnyMessage, Identify, Kill, PoisonPill, ReceiveTimeout,
        Terminated,
    },
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt::{Debug, Formatter},
};

/// A serialized message and the tag of its type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedValue {
    /// Tag the type was registered under.
    pub tag: String,
    /// `bincode` payload.
    pub payload: Vec<u8>,
}

/// Turns paths read from the wire back into references.
pub trait PathResolver {
    /// Reference to the actor at `path`: local, remote or nobody.
    fn resolve(&self, path: &ActorPath) -> ActorRef;
}

/// What encoders and decoders may need from the worker.
pub struct CodecContext<'a> {
    /// Globalized address of the worker.
    pub address: &'a WorkerAddress,
    /// Resolves decoded paths.
    pub resolver: &'a dyn PathResolver,
}

/// Encoder of one registered type.
pub type EncodeFn = fn(&AnyMessage, &CodecContext<'_>) -> Result<Vec<u8>, Error>;
/// Decoder of one registered type.
pub type DecodeFn = fn(&[u8], &CodecContext<'_>) -> Result<AnyMessage, Error>;

struct Registration {
    encode: EncodeFn,
    decode: DecodeFn,
}

/// Registry of the types a worker can send and receive. Read-only once built.
pub struct Codec {
    by_tag: HashMap<String, Registration>,
    tags: HashMap<TypeId, String>,
}

impl Codec {
    /// Encodes a message of a registered type.
    ///
    /// # Errors
    ///
    /// Returns `Error::Codec` if the type is not registered or serialization fails.
    ///
    pub fn encode(
        &self,
        message: &AnyMessage,
        ctx: &CodecContext<'_>,
    ) -> Result<EncodedValue, Error> {
        let tag = self.tags.get(&message.payload_type_id()).ok_or_else(|| {
            Error::Codec(format!(
                "type {} is not registered",
                message.type_name()
            ))
        })?;
        let registration = self.by_tag.get(tag).ok_or_else(|| {
            Error::Codec(format!("tag {} has no registration", tag))
        })?;
        Ok(EncodedValue {
            tag: tag.clone(),
            payload: (registration.encode)(message, ctx)?,
        })
    }

    /// Decodes a value produced by [`Codec::encode`] on any worker sharing the registry.
    ///
    /// # Errors
    ///
    /// Returns `Error::Codec` for unknown tags and malformed payloads.
    ///
    pub fn decode(
        &self,
        value: &EncodedValue,
        ctx: &CodecContext<'_>,
    ) -> Result<AnyMessage, Error> {
        let registration = self.by_tag.get(&value.tag).ok_or_else(|| {
            Error::Codec(format!("unknown tag {}", value.tag))
        })?;
        (registration.decode)(&value.payload, ctx)
    }

    /// Tag of `T`, if registered.
    pub fn tag_of<T: Any>(&self) -> Option<&str> {
        self.tags.get(&TypeId::of::<T>()).map(String::as_str)
    }

    /// True if a type was registered under `tag`.
    pub fn knows(&self, tag: &str) -> bool {
        self.by_tag.contains_key(tag)
    }
}

impl Default for Codec {
    fn default() -> Self {
        CodecBuilder::new().build()
    }
}

impl Debug for Codec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<&String> = self.by_tag.keys().collect();
        tags.sort();
        f.debug_struct("Codec").field("tags", &tags).finish()
    }
}

/// Builds a [`Codec`]. Starts with the built-in types already registered.
pub struct CodecBuilder {
    codec: Codec,
}

impl Default for CodecBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecBuilder {
    /// Builder with the built-in registrations: primitives, `String`, `Vec<u8>`,
    /// `ActorPath`, `ActorRef` and the runtime records.
    pub fn new() -> Self {
        let mut builder = Self {
            codec: Codec {
                by_tag: HashMap::new(),
                tags: HashMap::new(),
            },
        };
        builder.insert::<String>("string", encode_text, decode_serde::<String>);
        // String literals travel as owned strings.
        builder.alias::<&'static str>("string");
        builder.insert::<bool>("bool", encode_serde::<bool>, decode_serde::<bool>);
        builder.insert::<i32>("i32", encode_serde::<i32>, decode_serde::<i32>);
        builder.insert::<i64>("i64", encode_serde::<i64>, decode_serde::<i64>);
        builder.insert::<u32>("u32", encode_serde::<u32>, decode_serde::<u32>);
        builder.insert::<u64>("u64", encode_serde::<u64>, decode_serde::<u64>);
        builder.insert::<f64>("f64", encode_serde::<f64>, decode_serde::<f64>);
        builder.insert::<()>("unit", encode_serde::<()>, decode_serde::<()>);
        builder.insert::<Vec<u8>>("bytes", encode_serde::<Vec<u8>>, decode_serde::<Vec<u8>>);
        builder.insert::<ActorPath>(
            "actor-path",
            encode_serde::<ActorPath>,
            decode_serde::<ActorPath>,
        );
        builder.insert::<PoisonPill>(
            "poison-pill",
            encode_serde::<PoisonPill>,
            decode_serde::<PoisonPill>,
        );
        builder.insert::<Kill>("kill", encode_serde::<Kill>, decode_serde::<Kill>);
        builder.insert::<Identify>(
            "identify",
            encode_serde::<Identify>,
            decode_serde::<Identify>,
        );
        builder.insert::<ReceiveTimeout>(
            "receive-timeout",
            encode_serde::<ReceiveTimeout>,
            decode_serde::<ReceiveTimeout>,
        );
        builder.insert::<ActorRef>("actor-ref", encode_ref, decode_ref);
        builder.insert::<ActorIdentity>(
            "actor-identity",
            encode_identity,
            decode_identity,
        );
        builder.insert::<Terminated>(
            "terminated",
            encode_terminated,
            decode_terminated,
        );
        builder
    }

    fn insert<T: Any>(&mut self, tag: &str, encode: EncodeFn, decode: DecodeFn) {
        self.codec
            .by_tag
            .insert(tag.to_owned(), Registration { encode, decode });
        self.codec.tags.insert(TypeId::of::<T>(), tag.to_owned());
    }

    fn alias<T: Any>(&mut self, tag: &str) {
        self.codec.tags.insert(TypeId::of::<T>(), tag.to_owned());
    }

    /// Registers a serde type under `tag`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Codec` if the tag or the type is registered already.
    ///
    pub fn register<T>(self, tag: &str) -> Result<Self, Error>
    where
        T: Serialize + DeserializeOwned + Any + Send + Sync,
    {
        self.register_with::<T>(tag, encode_serde::<T>, decode_serde::<T>)
    }

    /// Registers a type with custom encoder and decoder, e.g. for records holding
    /// references.
    ///
    /// # Errors
    ///
    /// Returns `Error::Codec` if the tag or the type is registered already.
    ///
    pub fn register_with<T: Any>(
        mut self,
        tag: &str,
        encode: EncodeFn,
        decode: DecodeFn,
    ) -> Result<Self, Error> {
        if self.codec.by_tag.contains_key(tag) {
            return Err(Error::Codec(format!("tag {} is taken", tag)));
        }
        if self.codec.tags.contains_key(&TypeId::of::<T>()) {
            return Err(Error::Codec(format!(
                "type {} is registered already",
                std::any::type_name::<T>()
            )));
        }
        self.insert::<T>(tag, encode, decode);
        Ok(self)
    }

    /// Freezes the registry.
    pub fn build(self) -> Codec {
        self.codec
    }
}

fn downcast<'m, T: Any>(message: &'m AnyMessage) -> Result<&'m T, Error> {
    message.downcast_ref::<T>().ok_or_else(|| {
        Error::Codec(format!(
            "expected {}, found {}",
            std::any::type_name::<T>(),
            message.type_name()
        ))
    })
}

/// Encoder of any serde type.
pub fn encode_serde<T: Serialize + Any>(
    message: &AnyMessage,
    _ctx: &CodecContext<'_>,
) -> Result<Vec<u8>, Error> {
    Ok(bincode::serialize(downcast::<T>(message)?)?)
}

/// Decoder of any serde type.
pub fn decode_serde<T: DeserializeOwned + Any + Send + Sync>(
    bytes: &[u8],
    _ctx: &CodecContext<'_>,
) -> Result<AnyMessage, Error> {
    Ok(AnyMessage::new(bincode::deserialize::<T>(bytes)?))
}

fn encode_text(message: &AnyMessage, _ctx: &CodecContext<'_>) -> Result<Vec<u8>, Error> {
    let text = match message.downcast_ref::<&'static str>() {
        Some(text) => *text,
        None => downcast::<String>(message)?.as_str(),
    };
    Ok(bincode::serialize(text)?)
}

/// Deterministic encoding of a path.
pub fn encode_path(path: &ActorPath) -> Result<Vec<u8>, Error> {
    Ok(bincode::serialize(path)?)
}

/// Inverse of [`encode_path`].
pub fn decode_path(bytes: &[u8]) -> Result<ActorPath, Error> {
    Ok(bincode::deserialize(bytes)?)
}

fn encode_ref(message: &AnyMessage, ctx: &CodecContext<'_>) -> Result<Vec<u8>, Error> {
    let actor = downcast::<ActorRef>(message)?;
    encode_path(&actor.path().globalize(ctx.address))
}

fn decode_ref(bytes: &[u8], ctx: &CodecContext<'_>) -> Result<AnyMessage, Error> {
    let path = decode_path(bytes)?;
    Ok(AnyMessage::new(ctx.resolver.resolve(&path)))
}

#[derive(Serialize, Deserialize)]
struct WireIdentity {
    correlation: u64,
    subject: Option<ActorPath>,
}

fn encode_identity(
    message: &AnyMessage,
    ctx: &CodecContext<'_>,
) -> Result<Vec<u8>, Error> {
    let identity = downcast::<ActorIdentity>(message)?;
    Ok(bincode::serialize(&WireIdentity {
        correlation: identity.correlation,
        subject: identity
            .subject
            .as_ref()
            .map(|subject| subject.path().globalize(ctx.address)),
    })?)
}

fn decode_identity(
    bytes: &[u8],
    ctx: &CodecContext<'_>,
) -> Result<AnyMessage, Error> {
    let wire: WireIdentity = bincode::deserialize(bytes)?;
    Ok(AnyMessage::new(ActorIdentity {
        correlation: wire.correlation,
        subject: wire.subject.map(|path| ctx.resolver.resolve(&path)),
    }))
}

#[derive(Serialize, Deserialize)]
struct WireTerminated {
    actor: ActorPath,
    existence_confirmed: bool,
    address_terminated: bool,
}

fn encode_terminated(
    message: &AnyMessage,
    ctx: &CodecContext<'_>,
) -> Result<Vec<u8>, Error> {
    let terminated = downcast::<Terminated>(message)?;
    Ok(bincode::serialize(&WireTerminated {
        actor: terminated.actor.path().globalize(ctx.address),
        existence_confirmed: terminated.existence_confirmed,
        address_terminated: terminated.address_terminated,
    })?)
}

fn decode_terminated(
    bytes: &[u8],
    ctx: &CodecContext<'_>,
) -> Result<AnyMessage, Error> {
    let wire: WireTerminated = bincode::deserialize(bytes)?;
    Ok(AnyMessage::new(Terminated {
        actor: ctx.resolver.resolve(&wire.actor),
        existence_confirmed: wire.existence_confirmed,
        address_terminated: wire.address_terminated,
    }))
}

#[cfg(test)]
mod tests {

    use super::*;

    struct NoResolver;

    impl PathResolver for NoResolver {
        fn resolve(&self, _path: &ActorPath) -> ActorRef {
            ActorRef::nobody()
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ping {
        round: u32,
        label: String,
    }

    fn roundtrip(codec: &Codec, message: AnyMessage) -> AnyMessage {
        let address = WorkerAddress::worker("local", "a");
        let ctx = CodecContext {
            address: &address,
            resolver: &NoResolver,
        };
        let encoded = codec.encode(&message, &ctx).unwrap();
        codec.decode(&encoded, &ctx).unwrap()
    }

    #[test]
    fn test_registered_type() {
        let codec = CodecBuilder::new().register::<Ping>("ping").unwrap().build();
        assert_eq!(codec.tag_of::<Ping>(), Some("ping"));
        let decoded = roundtrip(
            &codec,
            AnyMessage::new(Ping {
                round: 3,
                label: "hello".to_owned(),
            }),
        );
        assert_eq!(
            decoded.downcast::<Ping>().unwrap(),
            Ping {
                round: 3,
                label: "hello".to_owned()
            }
        );
    }

    #[test]
    fn test_builtin_records() {
        let codec = Codec::default();
        assert!(roundtrip(&codec, AnyMessage::new(PoisonPill)).is::<PoisonPill>());
        assert_eq!(
            roundtrip(&codec, AnyMessage::new(Identify(7)))
                .downcast::<Identify>()
                .unwrap(),
            Identify(7)
        );
        assert_eq!(
            roundtrip(&codec, AnyMessage::new("text".to_owned()))
                .downcast::<String>()
                .unwrap(),
            "text"
        );
    }

    #[test]
    fn test_string_literal_decodes_as_string() {
        let codec = Codec::default();
        assert_eq!(codec.tag_of::<&'static str>(), Some("string"));
        assert_eq!(
            roundtrip(&codec, AnyMessage::new("ping"))
                .downcast::<String>()
                .unwrap(),
            "ping"
        );
    }

    #[test]
    fn test_unregistered_type() {
        let codec = Codec::default();
        let address = WorkerAddress::worker("local", "a");
        let ctx = CodecContext {
            address: &address,
            resolver: &NoResolver,
        };
        let result = codec.encode(&AnyMessage::new(Ping { round: 1, label: String::new() }), &ctx);
        assert!(matches!(result, Err(Error::Codec(_))));

        let unknown = EncodedValue {
            tag: "nope".to_owned(),
            payload: vec![],
        };
        assert!(matches!(codec.decode(&unknown, &ctx), Err(Error::Codec(_))));
    }

    #[test]
    fn test_duplicate_registration() {
        assert!(CodecBuilder::new().register::<String>("text").is_err());
        assert!(CodecBuilder::new().register::<Ping>("string").is_err());
    }

    #[test]
    fn test_malformed_payload() {
        let codec = Codec::default();
        let address = WorkerAddress::worker("local", "a");
        let ctx = CodecContext {
            address: &address,
            resolver: &NoResolver,
        };
        let broken = EncodedValue {
            tag: "string".to_owned(),
            payload: vec![0xff],
        };
        assert!(matches!(codec.decode(&broken, &ctx), Err(Error::Codec(_))));
    }

    #[test]
    fn test_path_encoding_is_deterministic() {
        let path: ActorPath = "rush://local@a/user/ping#12".parse().unwrap();
        let first = encode_path(&path).unwrap();
        assert_eq!(first, encode_path(&path.clone()).unwrap());
        assert_eq!(decode_path(&first).unwrap(), path);
    }

    #[test]
    fn test_refs_travel_as_global_paths() {
        let codec = Codec::default();
        let address = WorkerAddress::worker("local", "a");
        let ctx = CodecContext {
            address: &address,
            resolver: &NoResolver,
        };
        let local = ActorRef::nobody().child(&["user", "ping"]);
        let encoded = codec.encode(&AnyMessage::new(local), &ctx).unwrap();
        assert_eq!(encoded.tag, "actor-ref");
        let path = decode_path(&encoded.payload).unwrap();
        assert_eq!(path.address(), &address);
    }
}
