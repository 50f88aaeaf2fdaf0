//! Black-box tests for the Hark server live under `tests/`
