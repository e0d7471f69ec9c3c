//! Source-to-source translation back ends (spec §4.8, §4.9): LIR to C and
//! HIR to Emacs Lisp. Both are offered as plain translation passes over an
//! already-compiled module; neither shells out to a C or Lisp toolchain.

pub mod cback;
pub mod elback;

pub use cback::{translate_module as translate_to_c, CodegenError as CCodegenError};
pub use elback::{translate_module as translate_to_lisp, CodegenError as LispCodegenError};
