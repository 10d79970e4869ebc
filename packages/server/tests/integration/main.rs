mod common;

mod failures;
mod orphans;
mod search;
mod upload;
