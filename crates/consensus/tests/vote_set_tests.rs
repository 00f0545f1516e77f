//! Tests for vote collection and majority detection.
//!
//! These tests verify the vote set functionality including:
//! - Idempotent vote insertion per validator
//! - Majority detection against the committee size
//! - Signature verification
//! - Commit certificate aggregation

use meridian_consensus::{
    block_vote_bytes, Committee, MajorityVote, RoundKey, VoteRecord, VoteSet, VoteSetError,
};
use meridian_crypto::{DomainTag, ValidatorKeyPair};
use meridian_types::{ChainKey, H256};

fn create_committee(n: usize) -> (Committee, Vec<ValidatorKeyPair>) {
    let keys: Vec<ValidatorKeyPair> = (0..n).map(|_| ValidatorKeyPair::generate()).collect();
    let committee = Committee::new(keys.iter().map(|k| k.public_key().clone()).collect());
    (committee, keys)
}

fn domain() -> DomainTag {
    DomainTag::new_block_vote(ChainKey::Beacon.to_string())
}

fn create_signed_vote(key: &ValidatorKeyPair, block_hash: H256, approve: bool) -> VoteRecord {
    VoteRecord {
        validator: key.public_key().clone(),
        committee_index: 0,
        block_hash,
        approve,
        signature: key.sign_with_domain(&block_vote_bytes(&block_hash, approve), &domain()),
        received_at: 0,
    }
}

#[test]
fn test_duplicate_vote_overwrites() {
    let (committee, keys) = create_committee(4);
    let mut set = VoteSet::new(RoundKey::new(5, 0));
    let hash = H256::new([1u8; 32]);

    let replaced = set
        .add_vote(create_signed_vote(&keys[0], hash, false), &committee, &domain())
        .unwrap();
    assert!(!replaced);

    let replaced = set
        .add_vote(create_signed_vote(&keys[0], hash, true), &committee, &domain())
        .unwrap();
    assert!(replaced);

    assert_eq!(set.vote_count(), 1);
    assert!(set.get_vote(keys[0].public_key()).unwrap().approve);
    assert_eq!(set.rejections(), 0);
    assert_eq!(set.approvals(&hash), 1);
}

#[test]
fn test_majority_of_four_needs_three() {
    let (committee, keys) = create_committee(4);
    let mut set = VoteSet::new(RoundKey::new(5, 0));
    let hash = H256::new([2u8; 32]);

    for key in &keys[..2] {
        set.add_vote(create_signed_vote(key, hash, true), &committee, &domain())
            .unwrap();
    }
    assert_eq!(set.tally(&hash, committee.len()), MajorityVote::Pending);

    set.add_vote(create_signed_vote(&keys[2], hash, true), &committee, &domain())
        .unwrap();
    assert_eq!(set.tally(&hash, committee.len()), MajorityVote::Approved);
}

#[test]
fn test_rejections_reach_majority() {
    let (committee, keys) = create_committee(4);
    let mut set = VoteSet::new(RoundKey::new(5, 1));
    let hash = H256::new([3u8; 32]);

    for key in &keys[1..] {
        set.add_vote(create_signed_vote(key, hash, false), &committee, &domain())
            .unwrap();
    }
    assert_eq!(set.tally(&hash, committee.len()), MajorityVote::Rejected);
    assert!(set.certificate_for(&hash).is_none());
}

#[test]
fn test_approvals_for_other_block_do_not_count() {
    let (committee, keys) = create_committee(4);
    let mut set = VoteSet::new(RoundKey::new(5, 0));
    let active = H256::new([4u8; 32]);
    let other = H256::new([5u8; 32]);

    for key in &keys[..3] {
        set.add_vote(create_signed_vote(key, other, true), &committee, &domain())
            .unwrap();
    }
    assert_eq!(set.tally(&active, committee.len()), MajorityVote::Pending);
}

#[test]
fn test_non_member_vote_rejected() {
    let (committee, _keys) = create_committee(4);
    let outsider = ValidatorKeyPair::generate();
    let mut set = VoteSet::new(RoundKey::new(5, 0));

    let result = set.add_vote(
        create_signed_vote(&outsider, H256::new([1u8; 32]), true),
        &committee,
        &domain(),
    );
    assert!(matches!(result, Err(VoteSetError::NotInCommittee(_))));
    assert_eq!(set.vote_count(), 0);
}

#[test]
fn test_invalid_signature_rejected() {
    let (committee, keys) = create_committee(4);
    let mut set = VoteSet::new(RoundKey::new(5, 0));
    let hash = H256::new([1u8; 32]);

    // signed as a reject, presented as an approve
    let mut vote = create_signed_vote(&keys[1], hash, false);
    vote.approve = true;

    let result = set.add_vote(vote, &committee, &domain());
    assert!(matches!(result, Err(VoteSetError::InvalidSignature(_))));
    assert!(!set.has_voted(keys[1].public_key()));
}

#[test]
fn test_certificate_verifies_against_committee() {
    let (committee, keys) = create_committee(4);
    let mut set = VoteSet::new(RoundKey::new(9, 2));
    let hash = H256::new([6u8; 32]);

    for i in [3usize, 0, 2] {
        set.add_vote(create_signed_vote(&keys[i], hash, true), &committee, &domain())
            .unwrap();
    }
    set.add_vote(create_signed_vote(&keys[1], hash, false), &committee, &domain())
        .unwrap();

    let cert = set.certificate_for(&hash).unwrap();
    assert_eq!(cert.round_key, RoundKey::new(9, 2));
    assert_eq!(cert.signers, vec![0, 2, 3]);
    assert!(cert.verify(&committee, ChainKey::Beacon));
    assert!(!cert.verify(&committee, ChainKey::Shard(0)));
}
