// =============================================================================
// API Module
// =============================================================================
//
// Thin axum transport over AppState: read-only REST views and the WebSocket
// feed.

pub mod rest;
pub mod ws;
