//! Integration Tests for the MACI Coordinator Core
//!
//! Complete coordinator lifecycle:
//! 1. Key generation (coordinator + voters)
//! 2. Sign-ups
//! 3. Command signing, encryption, and publishing
//! 4. Batch message processing with randomized zeroth leaves
//! 5. Tallies and their fold invariants
//! 6. Circuit input construction for the prover

use halo2curves::ff::{Field, PrimeField};
use rand::rngs::OsRng;

use maci_core::*;

/// Sign a command, encrypt it under a fresh ephemeral ECDH key, and publish.
fn publish(state: &mut MaciState, signer: &Keypair, command: Command) {
    let ephemeral = Keypair::new(OsRng);
    let shared = ecdh_shared_key(&ephemeral.priv_key, &state.coordinator().pub_key)
        .expect("coordinator key is on the curve");
    let signature = command.sign(signer);
    let message = command.encrypt(&signature, shared, OsRng);
    state
        .publish_message(message, ephemeral.pub_key)
        .expect("message tree has room");
}

fn vote(signer: &Keypair, state_index: u64, option: u64, weight: u64, nonce: u64) -> Command {
    Command {
        state_index: Fr::from(state_index),
        new_pub_key: signer.pub_key,
        vote_option_index: Fr::from(option),
        new_vote_weight: Fr::from(weight),
        nonce: Fr::from(nonce),
        salt: fr_random(OsRng),
    }
}

#[test]
fn test_complete_voting_round() {
    // ========== Setup: Coordinator and Voters ==========

    let coordinator = Keypair::new(OsRng);
    let mut state = MaciState::new(MaciConfig::default(), coordinator).unwrap();

    let voters: Vec<Keypair> = (0..4).map(|_| Keypair::new(OsRng)).collect();
    for (i, voter) in voters.iter().enumerate() {
        let index = state.sign_up(voter.pub_key, Fr::from(100u64)).unwrap();
        assert_eq!(index, i + 1);
    }
    println!("✓ {} voters signed up", voters.len());

    // ========== Step 1: Publish a Batch of Commands ==========

    publish(&mut state, &voters[0], vote(&voters[0], 1, 0, 5, 1));
    publish(&mut state, &voters[1], vote(&voters[1], 2, 1, 3, 1));
    publish(&mut state, &voters[2], vote(&voters[2], 3, 0, 2, 1));
    // Invalid: nonce 2 before any accepted command
    publish(&mut state, &voters[3], vote(&voters[3], 4, 2, 4, 2));

    assert_eq!(state.messages().len(), 4);
    assert_eq!(state.enc_pub_keys().len(), 4);
    let message_root_before = state.gen_message_root();
    println!("✓ Published 4 messages (one deliberately invalid)");

    // ========== Step 2: Batch Witness, then Batch Processing ==========

    let random_leaf = StateLeaf::random(OsRng);
    let inputs = state
        .gen_batch_update_state_tree_circuit_inputs(0, 4, &random_leaf)
        .unwrap();
    assert_eq!(inputs["message"].as_array().unwrap().len(), 4);

    state.batch_process_message(0, 4, random_leaf);

    // Valid commands landed, the invalid one did not
    assert_eq!(state.users()[0].votes[0], Fr::from(5u64));
    assert_eq!(state.users()[0].voice_credit_balance, Fr::from(75u64));
    assert_eq!(state.users()[1].votes[1], Fr::from(3u64));
    assert_eq!(state.users()[2].votes[0], Fr::from(2u64));
    assert_eq!(state.users()[3].nonce, Fr::ZERO);

    // Publishing left the message tree where witness generation saw it
    assert_eq!(state.gen_message_root(), message_root_before);
    println!("✓ Batch processed: 3 accepted, 1 silently dropped");

    // ========== Step 3: Tally and Prover Inputs ==========

    let tally = state.compute_batch_vote_tally(0, 4).unwrap();
    assert_eq!(tally[0], Fr::from(7u64)); // 5 + 2
    assert_eq!(tally[1], Fr::from(3u64));
    assert_eq!(tally[2], Fr::ZERO);

    let tally_inputs = state
        .gen_quad_vote_tally_circuit_inputs(0, 4, fr_random(OsRng), fr_random(OsRng))
        .unwrap();
    assert_eq!(
        tally_inputs["full_state_root"].as_str().unwrap(),
        fr_to_decimal(&state.gen_state_root())
    );
    println!(
        "✓ Tally witness agrees with state root {}…",
        hex::encode(&state.gen_state_root().to_repr()[..8])
    );
}

#[test]
fn test_batch_randomization_decouples_roots() {
    // Two batches; the second contains no valid message at all, yet the
    // roots after the two batches must differ.
    let mut state = MaciState::new(MaciConfig::default(), Keypair::new(OsRng)).unwrap();
    let voter = Keypair::new(OsRng);
    state.sign_up(voter.pub_key, Fr::from(100u64)).unwrap();

    publish(&mut state, &voter, vote(&voter, 1, 0, 5, 1));
    // Garbage for batch 2: wrong nonce
    for _ in 0..4 {
        publish(&mut state, &voter, vote(&voter, 1, 0, 1, 9));
    }

    let leaf_one = StateLeaf::random(OsRng);
    state.batch_process_message(0, 4, leaf_one);
    assert_eq!(state.zeroth_state_leaf(), &leaf_one);
    let root_after_one = state.gen_state_root();

    state.batch_process_message(4, 4, StateLeaf::random(OsRng));
    let root_after_two = state.gen_state_root();

    assert_ne!(root_after_one, root_after_two);
    // The user record itself did not move between batches
    assert_eq!(state.users()[0].nonce, Fr::ONE);
}

#[test]
fn test_cumulative_tally_equals_fold() {
    // Eight users, each with an accepted vote; the cumulative tally at
    // start index 8 must equal the elementwise fold over users 0..=6.
    let mut state = MaciState::new(MaciConfig::default(), Keypair::new(OsRng)).unwrap();
    let voters: Vec<Keypair> = (0..8).map(|_| Keypair::new(OsRng)).collect();
    for voter in &voters {
        state.sign_up(voter.pub_key, Fr::from(100u64)).unwrap();
    }
    for (i, voter) in voters.iter().enumerate() {
        publish(
            &mut state,
            voter,
            vote(voter, (i + 1) as u64, (i % 4) as u64, (i + 1) as u64, 1),
        );
    }
    for i in 0..8 {
        state.process_message(i);
    }

    let cumulative = state.compute_cumulative_vote_tally(8);

    let mut expected = vec![Fr::ZERO; state.config().num_vote_options()];
    for user in &state.users()[..7] {
        for (acc, v) in expected.iter_mut().zip(&user.votes) {
            *acc += v;
        }
    }
    assert_eq!(cumulative, expected);

    // And the cumulative tally is the fold of the preceding batch tallies
    let batch_one = state.compute_batch_vote_tally(0, 4).unwrap();
    let batch_two = state.compute_batch_vote_tally(4, 4).unwrap();
    let folded: Vec<Fr> = batch_one
        .iter()
        .zip(&batch_two)
        .map(|(a, b)| a + b)
        .collect();
    assert_eq!(cumulative, folded);
}

#[test]
fn test_invalid_message_neutrality() {
    // A message failing any predicate leaves users untouched while still
    // occupying its slot in the message log.
    let mut state = MaciState::new(MaciConfig::default(), Keypair::new(OsRng)).unwrap();
    let voter = Keypair::new(OsRng);
    let outsider = Keypair::new(OsRng);
    state.sign_up(voter.pub_key, Fr::from(16u64)).unwrap();

    // Bad slot, bad signer, bad nonce, option out of range, overdraw
    publish(&mut state, &voter, vote(&voter, 7, 0, 1, 1));
    publish(&mut state, &outsider, vote(&outsider, 1, 0, 1, 1));
    publish(&mut state, &voter, vote(&voter, 1, 0, 1, 5));
    publish(&mut state, &voter, vote(&voter, 1, 9, 1, 1));
    publish(&mut state, &voter, vote(&voter, 1, 0, 5, 1));

    // And an otherwise valid command under an off-curve ephemeral key
    let command = vote(&voter, 1, 0, 1, 1);
    let signature = command.sign(&voter);
    let message = command.encrypt(&signature, Fr::from(5u64), OsRng);
    let bogus = PubKey(Point {
        x: Fr::from(3u64),
        y: Fr::from(7u64),
    });
    state.publish_message(message, bogus).unwrap();

    let users_before = state.users().to_vec();
    for i in 0..state.messages().len() {
        state.process_message(i);
    }

    assert_eq!(state.users(), &users_before[..]);
    assert_eq!(state.messages().len(), 6);
    assert_eq!(state.enc_pub_keys().len(), 6);
}

#[test]
fn test_builder_purity_on_clone() {
    let mut state = MaciState::new(MaciConfig::default(), Keypair::new(OsRng)).unwrap();
    let voters: Vec<Keypair> = (0..3).map(|_| Keypair::new(OsRng)).collect();
    for voter in &voters {
        state.sign_up(voter.pub_key, Fr::from(100u64)).unwrap();
    }
    for (i, voter) in voters.iter().enumerate() {
        publish(&mut state, voter, vote(voter, (i + 1) as u64, 0, 2, 1));
    }

    let snapshot = state.clone();

    state
        .gen_batch_update_state_tree_circuit_inputs(0, 4, &StateLeaf::random(OsRng))
        .unwrap();
    state.gen_update_state_tree_circuit_inputs(0).unwrap();
    state
        .gen_quad_vote_tally_circuit_inputs(0, 4, fr_random(OsRng), fr_random(OsRng))
        .unwrap();

    assert_eq!(state.users(), snapshot.users());
    assert_eq!(state.messages(), snapshot.messages());
    assert_eq!(state.enc_pub_keys(), snapshot.enc_pub_keys());
    assert_eq!(state.zeroth_state_leaf(), snapshot.zeroth_state_leaf());
    assert_eq!(state.gen_state_root(), snapshot.gen_state_root());
    assert_eq!(state.gen_message_root(), snapshot.gen_message_root());
}

#[test]
fn test_nonce_counts_accepted_commands() {
    let mut state = MaciState::new(MaciConfig::default(), Keypair::new(OsRng)).unwrap();
    let voter = Keypair::new(OsRng);
    state.sign_up(voter.pub_key, Fr::from(100u64)).unwrap();

    // Interleave valid and invalid commands
    publish(&mut state, &voter, vote(&voter, 1, 0, 1, 1)); // accepted
    publish(&mut state, &voter, vote(&voter, 1, 0, 1, 1)); // stale nonce
    publish(&mut state, &voter, vote(&voter, 1, 1, 2, 2)); // accepted
    publish(&mut state, &voter, vote(&voter, 1, 1, 99, 3)); // overdraw
    publish(&mut state, &voter, vote(&voter, 1, 2, 3, 3)); // accepted

    for i in 0..5 {
        state.process_message(i);
    }

    assert_eq!(state.users()[0].nonce, Fr::from(3u64));
}

#[test]
fn test_wire_shapes() {
    // The serde forms of the wire types are what the contract consumes
    let voter = Keypair::new(OsRng);
    let command = vote(&voter, 1, 0, 1, 1);
    let signature = command.sign(&voter);
    let message = command.encrypt(&signature, Fr::from(3u64), OsRng);

    let as_json = serde_json::to_value(message).unwrap();
    assert_eq!(as_json["data"].as_array().unwrap().len(), MESSAGE_DATA_LENGTH);

    let back: Message = serde_json::from_value(as_json).unwrap();
    assert_eq!(back, message);

    let pub_key_json = serde_json::to_value(voter.pub_key).unwrap();
    let pub_key_back: PubKey = serde_json::from_value(pub_key_json).unwrap();
    assert_eq!(pub_key_back, voter.pub_key);
}
