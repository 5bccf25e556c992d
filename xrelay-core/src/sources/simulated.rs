//! Synthesized deposits for demos and local runs.

use super::{ChainSource, SourceError};
use crate::config::SimulatedSourceConfig;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use xrelay_sdk::objects::RawDeposit;
use xrelay_sdk::objects::address::{AddressFormat, to_checksum_address};

pub struct SimulatedChainSource {
    chain_id: u64,
    config: SimulatedSourceConfig,
    rng: StdRng,
}

impl SimulatedChainSource {
    pub fn new(chain_id: u64, config: &SimulatedSourceConfig) -> Result<Self, SourceError> {
        Self::with_rng(chain_id, config, StdRng::from_os_rng())
    }

    /// Deterministic variant for tests.
    pub fn seeded(
        chain_id: u64,
        config: &SimulatedSourceConfig,
        seed: u64,
    ) -> Result<Self, SourceError> {
        Self::with_rng(chain_id, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        chain_id: u64,
        config: &SimulatedSourceConfig,
        rng: StdRng,
    ) -> Result<Self, SourceError> {
        let probability_ok = |p: f64| (0.0..=1.0).contains(&p);
        if !probability_ok(config.event_probability) || !probability_ok(config.failure_probability)
        {
            return Err(SourceError::Config(
                "simulated probabilities must lie in [0, 1]".into(),
            ));
        }
        if !AddressFormat::Evm.is_valid(&config.token_address) {
            return Err(SourceError::Config(format!(
                "invalid simulated token address {:?}",
                config.token_address
            )));
        }
        Ok(Self {
            chain_id,
            config: config.clone(),
            rng,
        })
    }

    fn generate(&mut self) -> Result<Option<RawDeposit>, SourceError> {
        if self.rng.random_bool(self.config.failure_probability) {
            return Err(SourceError::Unavailable(format!(
                "simulated outage on chain {}",
                self.chain_id
            )));
        }
        if !self.rng.random_bool(self.config.event_probability) {
            return Ok(None);
        }
        let tx_hash: [u8; 32] = self.rng.random();
        let depositor: [u8; 20] = self.rng.random();
        let recipient: [u8; 20] = self.rng.random();
        let whole_units: u128 = self.rng.random_range(100..10_000);
        Ok(Some(RawDeposit {
            transaction_hash: format!("0x{}", hex::encode(tx_hash)),
            destination_chain_id: self.config.destination_chain_id,
            depositor: to_checksum_address(&depositor),
            recipient: to_checksum_address(&recipient),
            token_address: self.config.token_address.clone(),
            amount: whole_units * 1_000_000,
        }))
    }
}

#[async_trait]
impl ChainSource for SimulatedChainSource {
    async fn fetch_new_deposits(&mut self) -> Result<Vec<RawDeposit>, SourceError> {
        Ok(self.generate()?.into_iter().collect())
    }
}
