//! Rotating quad demo
//!
//! Built both as the `quad_app` binary and as a shared library exporting
//! `create_game`, so a running binary can hot-reload a rebuilt scene:
//!
//! ```text
//! quad_app --game-lib target/debug/libquad_app.so
//! ```

pub mod args;
pub mod scene;
