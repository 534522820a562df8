use crate::{state::Store, Error, Layer, Memory, Policy};
use commonware_cryptography::{
    ed25519::{PrivateKey, PublicKey},
    PrivateKeyExt, Signer,
};
use memento_types::{Currency, Event, Instruction, Intent, Pool};
use rand::{rngs::StdRng, SeedableRng};

/// Creates an account keypair for Ed25519 signatures used by users
pub fn create_account_keypair(seed: u64) -> (PrivateKey, PublicKey) {
    let mut rng = StdRng::seed_from_u64(seed);
    let private = PrivateKey::from_rng(&mut rng);
    let public = private.public_key();
    (private, public)
}

/// Funds `accounts` with MMC and seeds `pools`, committing the result.
pub async fn fund(state: &mut Memory, accounts: &[(PublicKey, f64)], pools: &[Pool]) {
    let mut layer = Layer::new(&*state, Policy::default(), 0, 0);
    for (account, mmc) in accounts {
        layer
            .grant(account, Currency::Mmc, *mmc)
            .await
            .expect("failed to fund account");
    }
    for pool in pools {
        layer.seed_pool(*pool).expect("failed to seed pool");
    }
    let changeset = layer.commit();
    state.commit(changeset).await.expect("genesis commit failed");
}

/// Runs one intent in its own layer and commits it.
pub async fn submit(
    state: &mut Memory,
    policy: &Policy,
    entropy: u64,
    user: &PublicKey,
    instruction: Instruction,
) -> Result<Vec<Event>, Error> {
    let mut layer = Layer::new(&*state, policy.clone(), entropy, 0);
    let events = layer.apply(&Intent::new(user.clone(), instruction)).await?;
    let changeset = layer.commit();
    state.commit(changeset).await?;
    Ok(events)
}
