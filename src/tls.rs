//! TLS configuration: `TlsContext`, a reference-counted shared configuration
//! object, and `TlsHandle`, the per-connection state it issues.
//!
//! Grounded on `examples/original_source/ppl7/src/internet/openssl.cpp`,
//! which wraps an `SSL_CTX*` with a hand-rolled mutex and reference count.
//! This crate uses the `openssl` crate's `SslContextBuilder`/`SslContext`/
//! `Ssl` types instead of raw FFI, and a `parking_lot::Mutex` for the
//! builder-vs-active state machine (the stack crate already depends on
//! `parking_lot` for exactly this kind of shared, lock-guarded state — see
//! `core.rs`'s `NetworkState`).

use std::sync::Arc;

use openssl::dh::Dh;
use openssl::pkey::Private;
use openssl::ssl::{Ssl, SslContext, SslContextBuilder, SslFiletype, SslMethod, SslVerifyMode, SslVersion};
use parking_lot::Mutex;

use crate::error::{NetError, Result};

/// `method` in spec.md §4.C. A `Tls` context explicitly disables SSLv2 and
/// SSLv3 on `init()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMethod {
    Tls,
    TlsClient,
    TlsServer,
}

impl TlsMethod {
    fn to_openssl(self) -> SslMethod {
        match self {
            TlsMethod::Tls => SslMethod::tls(),
            TlsMethod::TlsClient => SslMethod::tls_client(),
            TlsMethod::TlsServer => SslMethod::tls_server(),
        }
    }
}

enum State {
    Unconfigured,
    /// Configuration is still mutable; no handle has been issued yet.
    Configuring(SslContextBuilder),
    /// Finalized into an immutable, shareable `SslContext`; handles have
    /// been (or are being) issued against it.
    Active(SslContext),
    ShutDown,
}

struct Inner {
    state: State,
    reference_count: usize,
}

/// Owns one configured TLS stack instance plus a reference count of live
/// per-connection handles it has issued.
///
/// `shutdown()` fails with `SslContextInUse` while `reference_count != 0`.
/// All mutation goes through an internal lock, so a running server may hand
/// out handles concurrently while configuration is frozen.
pub struct TlsContext {
    inner: Arc<Mutex<Inner>>,
}

impl Clone for TlsContext {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

/// A per-connection TLS handle issued by a `TlsContext`. Carries the
/// `Ssl` object the endpoint binds to its socket descriptor. On drop it
/// returns itself to the issuing context (decrementing the reference
/// count) so a `TcpEndpoint` that started TLS need not remember to call
/// `release_handle` explicitly — though it may still do so eagerly via
/// `TlsContext::release_handle`.
pub struct TlsHandle {
    ssl: Option<Ssl>,
    ctx: TlsContext,
    released: bool,
}

impl TlsHandle {
    pub fn take_ssl(&mut self) -> Ssl {
        self.ssl.take().expect("TlsHandle::take_ssl called twice")
    }
}

impl Drop for TlsHandle {
    fn drop(&mut self) {
        if !self.released {
            self.ctx.release_handle_infallible();
        }
    }
}

impl TlsContext {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(Inner { state: State::Unconfigured, reference_count: 0 })) }
    }

    /// `Unconfigured -> Configured`. A `Tls` method disables SSLv2/SSLv3 by
    /// requiring at least TLS 1.0.
    pub fn init(&self, method: TlsMethod) -> Result<()> {
        let mut builder = SslContextBuilder::new(method.to_openssl())
            .map_err(|e| NetError::Ssl(e.to_string()))?;
        builder
            .set_min_proto_version(Some(SslVersion::TLS1))
            .map_err(|e| NetError::Ssl(e.to_string()))?;
        builder.set_verify(SslVerifyMode::PEER);

        let mut guard = self.inner.lock();
        guard.state = State::Configuring(builder);
        Ok(())
    }

    /// `shutdown()` requires `reference_count == 0`.
    pub fn shutdown(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        if guard.reference_count != 0 {
            return Err(NetError::SslContextInUse);
        }
        guard.state = State::ShutDown;
        Ok(())
    }

    pub fn reference_count(&self) -> usize {
        self.inner.lock().reference_count
    }

    /// Issues a new per-connection handle, incrementing the reference
    /// count. Finalizes the builder into an immutable `SslContext` on the
    /// first call (the `openssl` crate's safe bindings do not support
    /// mutating a built `SSL_CTX`, unlike the raw C API the source wraps
    /// directly — see DESIGN.md).
    pub fn new_handle(&self) -> Result<TlsHandle> {
        let mut guard = self.inner.lock();
        let ctx = match &guard.state {
            State::Configuring(_) => {
                let State::Configuring(builder) =
                    std::mem::replace(&mut guard.state, State::Unconfigured)
                else {
                    unreachable!()
                };
                let ctx = builder.build();
                guard.state = State::Active(ctx.clone());
                ctx
            }
            State::Active(ctx) => ctx.clone(),
            State::Unconfigured => return Err(NetError::SslContextUninitialized),
            State::ShutDown => return Err(NetError::SslContextUninitialized),
        };
        guard.reference_count += 1;
        drop(guard);

        let ssl = Ssl::new(&ctx).map_err(|e| NetError::Ssl(e.to_string()))?;
        Ok(TlsHandle { ssl: Some(ssl), ctx: self.clone(), released: false })
    }

    /// Explicitly releases a handle ahead of its `Drop`. Fails with
    /// `SslReferenceCounterMismatch` if the count is already zero.
    pub fn release_handle(&self, mut handle: TlsHandle) -> Result<()> {
        let mut guard = self.inner.lock();
        if guard.reference_count == 0 {
            return Err(NetError::SslReferenceCounterMismatch);
        }
        guard.reference_count -= 1;
        handle.released = true;
        Ok(())
    }

    fn release_handle_infallible(&self) {
        let mut guard = self.inner.lock();
        if guard.reference_count > 0 {
            guard.reference_count -= 1;
        }
    }

    fn with_builder<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut SslContextBuilder) -> std::result::Result<(), openssl::error::ErrorStack>,
    {
        let mut guard = self.inner.lock();
        match &mut guard.state {
            State::Configuring(builder) => f(builder).map_err(|e| NetError::Ssl(e.to_string())),
            State::Unconfigured => Err(NetError::SslContextUninitialized),
            State::Active(_) => {
                Err(NetError::Ssl("context already active; configure before the first handle".into()))
            }
            State::ShutDown => Err(NetError::SslContextUninitialized),
        }
    }

    pub fn load_trusted_ca_from_file(&self, path: &str) -> Result<()> {
        self.with_builder(|b| b.set_ca_file(path))
    }

    pub fn load_trusted_ca_from_path(&self, dir: &str) -> Result<()> {
        self.with_builder(|b| b.load_verify_locations(None, Some(std::path::Path::new(dir))))
    }

    /// Loads a PEM certificate chain and its private key; if `key_path` is
    /// empty the key is read from `cert_path`. `password`, if non-empty,
    /// decrypts an encrypted private key.
    pub fn load_certificate(
        &self,
        cert_path: &str,
        key_path: &str,
        password: &str,
    ) -> Result<()> {
        let key_path = if key_path.is_empty() { cert_path } else { key_path };
        let password = password.to_string();
        let mut guard = self.inner.lock();
        match &mut guard.state {
            State::Configuring(builder) => {
                builder
                    .set_certificate_chain_file(cert_path)
                    .map_err(|e| NetError::InvalidSslCertificate(e.to_string()))?;
                if password.is_empty() {
                    builder
                        .set_private_key_file(key_path, SslFiletype::PEM)
                        .map_err(|e| NetError::SslPrivateKey(e.to_string()))?;
                } else {
                    let pem = std::fs::read(key_path)
                        .map_err(|e| NetError::SslPrivateKey(e.to_string()))?;
                    let pkey: openssl::pkey::PKey<Private> =
                        openssl::pkey::PKey::private_key_from_pem_passphrase(
                            &pem,
                            password.as_bytes(),
                        )
                        .map_err(|e| NetError::SslPrivateKey(e.to_string()))?;
                    builder.set_private_key(&pkey).map_err(|e| NetError::SslPrivateKey(e.to_string()))?;
                }
                Ok(())
            }
            State::Unconfigured => Err(NetError::SslContextUninitialized),
            State::Active(_) => {
                Err(NetError::Ssl("context already active; configure before the first handle".into()))
            }
            State::ShutDown => Err(NetError::SslContextUninitialized),
        }
    }

    /// Configures the allowed cipher list; fails with `InvalidSslCipher` if
    /// none are acceptable.
    pub fn set_cipher_list(&self, spec: &str) -> Result<()> {
        self.with_builder(|b| b.set_cipher_list(spec)).map_err(|e| match e {
            NetError::Ssl(_) => NetError::InvalidSslCipher,
            other => other,
        })
    }

    /// Loads ephemeral DH parameters from a PEM file.
    pub fn set_tmp_dh_param(&self, file: &str) -> Result<()> {
        let pem = std::fs::read(file).map_err(|e| NetError::SslFailedToReadDhParams(e.to_string()))?;
        let dh = Dh::params_from_pem(&pem).map_err(|e| NetError::SslFailedToReadDhParams(e.to_string()))?;
        self.with_builder(|b| b.set_tmp_dh(&dh))
            .map_err(|e| NetError::SslFailedToReadDhParams(e.to_string()))
    }
}

impl Default for TlsContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_counting_blocks_shutdown() {
        let ctx = TlsContext::new();
        ctx.init(TlsMethod::Tls).unwrap();
        let h1 = ctx.new_handle().unwrap();
        let h2 = ctx.new_handle().unwrap();
        assert_eq!(ctx.reference_count(), 2);
        assert!(matches!(ctx.shutdown(), Err(NetError::SslContextInUse)));

        ctx.release_handle(h1).unwrap();
        assert_eq!(ctx.reference_count(), 1);
        assert!(ctx.shutdown().is_err());

        ctx.release_handle(h2).unwrap();
        assert_eq!(ctx.reference_count(), 0);
        assert!(ctx.shutdown().is_ok());
    }

    #[test]
    fn drop_releases_handle() {
        let ctx = TlsContext::new();
        ctx.init(TlsMethod::Tls).unwrap();
        {
            let _h = ctx.new_handle().unwrap();
            assert_eq!(ctx.reference_count(), 1);
        }
        assert_eq!(ctx.reference_count(), 0);
        assert!(ctx.shutdown().is_ok());
    }

    #[test]
    fn uninitialized_context_rejects_handle() {
        let ctx = TlsContext::new();
        assert!(matches!(ctx.new_handle(), Err(NetError::SslContextUninitialized)));
    }
}
