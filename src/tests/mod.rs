//! Cross-module tests for admission control.
