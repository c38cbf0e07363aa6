//! Outbound HTTP calls to other nodes. Every request carries the client-wide
//! timeout; callers log failures and move on to the next peer.

use ledger_core::{Block, PeerChain, PeerClient, PeerError};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

use crate::api::{NewPeer, NewTransaction, PeersBody};

#[derive(Clone)]
pub struct HttpPeerClient {
    http: reqwest::Client,
}

fn network(peer: &str, e: reqwest::Error) -> PeerError {
    PeerError::Network {
        peer: peer.to_string(),
        message: e.to_string(),
    }
}

impl HttpPeerClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { http })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        peer: &str,
        path: &str,
    ) -> Result<T, PeerError> {
        let res = self
            .http
            .get(format!("{peer}{path}"))
            .send()
            .await
            .map_err(|e| network(peer, e))?;
        if !res.status().is_success() {
            return Err(PeerError::Status {
                peer: peer.to_string(),
                status: res.status().as_u16(),
            });
        }
        let bytes = res.bytes().await.map_err(|e| network(peer, e))?;
        serde_json::from_slice(&bytes).map_err(|e| PeerError::Malformed {
            peer: peer.to_string(),
            message: e.to_string(),
        })
    }

    /// POST `body`; any status is accepted, the peer decides what to do
    /// with it.
    async fn post_json<B: Serialize>(
        &self,
        peer: &str,
        path: &str,
        body: &B,
    ) -> Result<u16, PeerError> {
        let res = self
            .http
            .post(format!("{peer}{path}"))
            .json(body)
            .send()
            .await
            .map_err(|e| network(peer, e))?;
        Ok(res.status().as_u16())
    }

    pub async fn fetch_peers(&self, peer: &str) -> Result<Vec<String>, PeerError> {
        let body: PeersBody = self.get_json(peer, "/peers").await?;
        Ok(body.peers)
    }

    pub async fn push_block(&self, peer: &str, block: &Block) -> Result<u16, PeerError> {
        self.post_json(peer, "/blocks/receive", block).await
    }

    pub async fn push_transaction(
        &self,
        peer: &str,
        tx: &NewTransaction,
    ) -> Result<u16, PeerError> {
        self.post_json(peer, "/transactions/new", tx).await
    }

    pub async fn announce(&self, peer: &str, me: &str) -> Result<u16, PeerError> {
        let body = NewPeer {
            peer: me.to_string(),
        };
        self.post_json(peer, "/peers/add", &body).await
    }
}

impl PeerClient for HttpPeerClient {
    async fn fetch_chain(&self, peer: &str) -> Result<PeerChain, PeerError> {
        self.get_json(peer, "/chain").await
    }
}
