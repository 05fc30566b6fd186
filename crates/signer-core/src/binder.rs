//! Binds the provider's active account to a ledger address.
//!
//! Binding costs one challenge signature per account: the public key is
//! recovered from it and cached, and the ledger address is derived from
//! the key. A cached binding is dropped as soon as the active account or
//! the network changes, and is never reused for another account.

use std::collections::VecDeque;

use chain_substrate::ss58::NetworkPrefix;
use tracing::{debug, info};

use crate::codec::{derive_ledger_address, external_address_of, recover_public_key};
use crate::config::BridgeConfig;
use crate::error::SignerError;
use crate::gateway::{ExternalSignerGateway, GatewayChange};
use crate::provider::SigningProvider;
use crate::types::{BoundIdentity, ExternalAddress, LedgerAddress, PublicKey};

#[derive(Debug, Clone)]
struct Binding {
    account: ExternalAddress,
    public_key: PublicKey,
    ledger: LedgerAddress,
}

/// A provider change as seen by the binder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinderChange {
    pub change: GatewayChange,
    /// A binding existed and was discarded because of this change.
    pub invalidated: bool,
}

pub struct AccountBinder<P> {
    gateway: ExternalSignerGateway<P>,
    challenge: String,
    verify_signer: bool,
    binding: Option<Binding>,
    /// Bumped on every account or network change.
    session: u64,
    /// Applied but not yet taken.
    pending: VecDeque<BinderChange>,
}

impl<P: SigningProvider + 'static> AccountBinder<P> {
    pub fn new(gateway: ExternalSignerGateway<P>, config: &BridgeConfig) -> Self {
        Self {
            gateway,
            challenge: config.challenge_message.clone(),
            verify_signer: config.verify_signer,
            binding: None,
            session: 0,
            pending: VecDeque::new(),
        }
    }

    pub fn gateway(&self) -> &ExternalSignerGateway<P> {
        &self.gateway
    }

    /// The active account with its ledger address, if it is bound.
    pub fn identity(&mut self) -> Option<BoundIdentity> {
        self.sync();
        let external_address = self.gateway.applied_active_account()?;
        let ledger_address = self
            .binding
            .as_ref()
            .filter(|b| b.account == external_address)
            .map(|b| b.ledger.clone());
        Some(BoundIdentity {
            external_address,
            ledger_address,
        })
    }

    /// Public key of the active account, if it is bound.
    pub fn public_key(&mut self) -> Option<PublicKey> {
        self.sync();
        let active = self.gateway.applied_active_account()?;
        self.binding
            .as_ref()
            .filter(|b| b.account == active)
            .map(|b| b.public_key)
    }

    /// Produces the bound identity for the active account.
    ///
    /// Idempotent: if the active account is already bound this returns the
    /// cached identity without prompting. A different `prefix` re-encodes
    /// the cached key, also without prompting.
    pub async fn bind(&mut self, prefix: NetworkPrefix) -> Result<BoundIdentity, SignerError> {
        self.sync();

        if let Some(active) = self.gateway.applied_active_account() {
            if let Some(binding) = self.binding.as_mut().filter(|b| b.account == active) {
                if binding.ledger.prefix() != prefix {
                    binding.ledger = derive_ledger_address(&binding.public_key, prefix);
                    debug!(ledger = %binding.ledger, %prefix, "re-derived ledger address");
                }
                return Ok(BoundIdentity {
                    external_address: active,
                    ledger_address: Some(binding.ledger.clone()),
                });
            }
        }

        let account = match self.gateway.applied_active_account() {
            Some(account) => account,
            None => self
                .gateway
                .activate()
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| SignerError::ProviderError("no active account".into()))?,
        };

        let session = self.session;
        let challenge = self.challenge.as_bytes().to_vec();
        let signature = self
            .gateway
            .request_signature(&account, &challenge)
            .await?;

        // The account or network may have changed while the prompt was open.
        self.sync();
        if self.session != session
            || self.gateway.applied_active_account().as_ref() != Some(&account)
        {
            debug!(%account, "provider changed during challenge");
            return Err(SignerError::StaleBinding);
        }

        let public_key = recover_public_key(account.as_str(), &challenge, &signature)?;
        if self.verify_signer {
            let recovered = external_address_of(&public_key)?;
            if recovered != account {
                return Err(SignerError::SignerMismatch {
                    expected: account.to_string(),
                    recovered: recovered.to_string(),
                });
            }
        }

        let ledger = derive_ledger_address(&public_key, prefix);
        info!(%account, %ledger, "account bound");
        self.binding = Some(Binding {
            account: account.clone(),
            public_key,
            ledger: ledger.clone(),
        });

        Ok(BoundIdentity {
            external_address: account,
            ledger_address: Some(ledger),
        })
    }

    /// Takes the next provider change, waiting for one if none is queued.
    pub async fn next_change(&mut self) -> Option<BinderChange> {
        if let Some(change) = self.pending.pop_front() {
            return Some(change);
        }
        let change = self.gateway.next_change().await?;
        Some(self.on_change(change))
    }

    /// Applies and takes every queued provider change. Returns whether a
    /// binding was discarded.
    pub fn drain_changes(&mut self) -> bool {
        self.sync();
        self.pending
            .drain(..)
            .fold(false, |invalidated, change| invalidated | change.invalidated)
    }

    /// Applies every queued provider change to the binding. The changes
    /// stay queued for [`Self::next_change`] and [`Self::drain_changes`].
    pub fn sync(&mut self) {
        while let Some(change) = self.gateway.try_next_change() {
            let change = self.on_change(change);
            self.pending.push_back(change);
        }
    }

    /// Drops the cached binding.
    pub fn unbind(&mut self) {
        if let Some(binding) = self.binding.take() {
            debug!(account = %binding.account, "binding discarded");
        }
    }

    fn on_change(&mut self, change: GatewayChange) -> BinderChange {
        if change.is_identity_change() {
            self.session += 1;
        }
        let stale = match (&change, &self.binding) {
            (_, None) => false,
            (GatewayChange::Network { .. }, Some(_)) => true,
            (GatewayChange::Accounts { active, .. }, Some(binding)) => {
                active.as_ref() != Some(&binding.account)
            }
        };
        if stale {
            self.unbind();
        }
        BinderChange {
            change,
            invalidated: stale,
        }
    }
}
