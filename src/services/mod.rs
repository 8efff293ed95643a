//! Service layer for the timetable crawler.
//!
//! This module contains the collaborators around the reconciliation core:
//! - Portal access (`WigorPortal`, `TimetableSource`)
//! - Markup extraction (`parse_timetable`)
//! - Slot normalization (`SlotNormalizer`)

mod normalizer;
mod portal;
mod timetable;

pub use normalizer::{Normalized, SlotNormalizer, resolve_day};
pub use portal::{PortalSession, TimetableSource, WigorPortal};
pub use timetable::parse_timetable;
