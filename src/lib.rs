//! Covenant - role gating, constitutional validation and KYC risk scoring
//! for the learning platform's service layer

pub mod engine;
