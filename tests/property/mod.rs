// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Module
//!
//! This module contains property-based tests using proptest to verify
//! the replay laws of write models and the arithmetic of quota periods.

mod period;
mod replay;
