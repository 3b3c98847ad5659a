mod apply_changes;
mod basic;
mod cascade;
mod changes;
mod validation;
