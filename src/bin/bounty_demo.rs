//! Information Bounty Demo
//!
//! Runs the whole protocol locally: the poster escrows a reward for the
//! factorization of `n`, a solver claims it with a proof, and the poster
//! recovers the factors from the claim's data output.
//!
//! Usage: `bounty-demo [config.json]` (set `RUST_LOG=info` for protocol logs)

use anyhow::{anyhow, Result};
use ark_bn254::Fr;
use num_bigint::BigUint;
use rand::rngs::OsRng;
use rand::RngCore;
use info_bounty::{
    BountyRelation, CheckingBackend, Escrow, OutPoint, Poster, ProofSystem, ProtocolConfig, RelationParams, Solver,
};
use info_bounty::crypto::KeyAgreement;

const P_1024: &str = "84102226189931597204228074020861136329889927593666544679790818418208050232689529735088785671967555126288131210906309673238385952888184646056701546267152983157209204178832636744126636676765506035710343020385405332519258369909033933883276849025592411318178524227006970911149528928068344969907921225222253552759";
const Q_1024: &str = "69227124116797173792607322097623651900186824540546740345955227424547330221880094641332718074911771220677020023646982676844502920924653525076956524065499369561259749151984512521544089172137726149696268189532069007446227350457277994250148911361041938621241351126892097452001343025320798183836404152872960236563";

fn demo_factors(params: &RelationParams) -> Result<(BigUint, BigUint)> {
    if params.factor_limbs >= 16 {
        let p = P_1024.parse().map_err(|e| anyhow!("bad constant: {:?}", e))?;
        let q = Q_1024.parse().map_err(|e| anyhow!("bad constant: {:?}", e))?;
        Ok((p, q))
    } else {
        Ok((BigUint::from(4_294_967_291u64), BigUint::from(4_294_967_279u64)))
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => ProtocolConfig::from_json_file(path)?,
        None => ProtocolConfig::default(),
    };
    println!("🔐 Information Bounty Demo");
    println!("{}", "=".repeat(60));

    let permutation = config.permutation()?;
    let relation = BountyRelation::new(config.relation_params(), &permutation);
    let backend = CheckingBackend::new();
    let (pk, vk) = backend.setup(&relation, &mut OsRng)?;

    // Step 1: poster escrows the reward
    let (p, q) = demo_factors(relation.params())?;
    let (poster_scalar, _) = KeyAgreement::generate_keypair(&mut OsRng);
    let poster = Poster::new(poster_scalar, &p * &q);
    let bounty = poster.create_bounty(&relation, vk, config.reward_sats, config.expiry_height)?;
    let mut escrow = Escrow::new(bounty);
    let mut txid = [0u8; 32];
    OsRng.fill_bytes(&mut txid);
    let outpoint = OutPoint { txid, vout: 0 };
    println!("\n1️⃣  Bounty posted for a {}-bit modulus, reward {} sats", poster.modulus().bits(), config.reward_sats);

    // Step 2: solver encrypts, proves and builds the claim
    let mut solver = Solver::random(&mut OsRng);
    let nonce = Fr::from(OsRng.next_u64());
    let claim = solver.prepare_claim(&backend, &pk, &relation, escrow.params(), &p, &q, nonce)?;
    let tx = claim.transaction(outpoint);
    println!("2️⃣  Claim prepared, commitment {}", claim.message.commitment.to_hex());

    // Step 3: settlement
    let payout = escrow
        .claim(&backend, claim.message, &tx)
        .map_err(|r| anyhow!("claim rejected: {}", r))?;
    println!("3️⃣  Claim settled: {} sats to {}", payout.amount, hex::encode(&payout.script_pubkey));

    // Step 4: poster reads the solution off the ledger
    let (p_found, q_found) = poster.recover_factors(&relation, &tx.outputs[1].script_pubkey)?;
    println!("4️⃣  Poster recovered factors of {} and {} bits", p_found.bits(), q_found.bits());

    println!("\n✅ Escrow state: {:?}", escrow.state());
    Ok(())
}
