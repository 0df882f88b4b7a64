//! Wave-based resolution (spec §4.5): turns an `ExecutionGraph` built by
//! [`crate::builder`] into one where every reachable `VarDeclIr` carries its
//! `ExprId`, every `If`/`When` has picked a branch, and every `For` has been
//! unrolled.
//!
//! Grounded on the teacher's split between "pure evaluation" (`eval.rs`,
//! already generalized in [`crate::eval`]) and "the thing that drives it
//! wave by wave" — here, [`wave::Resolver`]. A wave in this crate is one
//! nesting level of a block: the statements directly inside a function
//! body, an if/else branch, a for-body, a when-arm, or a try/catch/finally
//! section. Each such block resolves its own `VarDecl`s and decorator calls
//! before any nested block is entered, and each nested block is its own
//! subsequent wave — so wave depth tracks block nesting depth, and progress
//! within a wave is the usual "keep evaluating what has become ready" loop
//! (spec §4.5 step 1-4), just scoped to one block at a time rather than
//! batched across the whole graph at once.

mod wave;

pub use wave::{resolve, resolve_function};
