//! # webp-sidecar
//!
//! Converts JPEG/PNG uploads into sibling `.webp` files and manages the
//! derived-file lifecycle for a hosting CMS: creation on upload, existence-
//! checked skips, metadata bookkeeping, error logging, and deletion cascades
//! when the source goes away.
//!
//! # Architecture
//!
//! One conversion is a single synchronous call through a fixed pipeline:
//!
//! ```text
//! ImageSource → resolve path → derive .webp sibling → type gate →
//!   existence short-circuit → resolve options → backend encode → public URL
//! ```
//!
//! The engine is stateless and backend-agnostic; five encoder strategies
//! hide behind one trait, and lifecycle reactors consume the outcome without
//! ever feeding back into the engine.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`paths`] | Pure path math: upload-base URL↔directory mapping, `.webp` sibling derivation |
//! | [`backend`] | `WebpEncoder` trait, the five encoder strategies, and the injected registry |
//! | [`engine`] | The conversion state machine — the only module with real branching logic |
//! | [`options`] | Per-call option resolution: defaults ← stored settings ← filter hook |
//! | [`config`] | `config.toml` settings: quality, converter, upload/page_load/logs gates |
//! | [`lifecycle`] | Reactors: metadata recorder, error logger, deletion cascade |
//! | [`host`] | CMS boundary trait, lifecycle trigger adapters, in-memory host |
//! | [`types`] | `ImageSource` and the attachment id |
//!
//! # Design Decisions
//!
//! ## Sibling Naming, Not Content Addressing
//!
//! A source at `…/2024/01/photo.jpeg` always derives `…/2024/01/photo.webp`.
//! Deterministic naming is what lets the engine skip work with a bare
//! existence check — no manifest, no database of derived files. The flip
//! side is accepted and documented: a stale or corrupted `.webp` is treated
//! as valid and never re-encoded.
//!
//! ## Five Backends Behind One Trait
//!
//! The default backend re-encodes in-process (`image` crate decode + libwebp
//! encode) and needs no system binaries. The other four shell out to
//! `cwebp`, `ffmpeg`, ImageMagick or GraphicsMagick for hosts that already
//! ship them. Selection is a configuration string; unknown values degrade to
//! the in-process default rather than failing the conversion.
//!
//! ## Errors Are Results, Not Events
//!
//! Backend faults — missing binaries, corrupt inputs, non-zero exits — are
//! all captured at the engine boundary and come back as a three-kind
//! [`engine::ConversionError`]. Callers substituting URLs during page render
//! fall back to the original image on any failure; viewers never see an
//! error.
//!
//! ## No Queue, No Locks
//!
//! Conversions run synchronously on the host's event-dispatch thread. Two
//! simultaneous conversions of the same source race on the existence check
//! and the destination write; last writer wins. The design accepts this
//! instead of locking — the destination bytes are deterministic for a given
//! source and quality, so the race is harmless in practice.

pub mod backend;
pub mod config;
pub mod engine;
pub mod host;
pub mod lifecycle;
pub mod options;
pub mod paths;
pub mod types;
