//! SeaORM adapters. Functions return `DbErr`; the store maps them to `DomainError`.

pub mod sessions_sea;
pub mod stories_sea;
pub mod votes_sea;
