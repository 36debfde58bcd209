//! Cross-crate behavior tests for the classpatch workspace.

#[cfg(test)]
mod support;

#[cfg(test)]
mod core;

#[cfg(test)]
mod document;

#[cfg(test)]
mod engine;
