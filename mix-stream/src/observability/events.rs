//! Canonical structured event names used across `mix-stream`.

// Egress worker and pool events.
pub const EGRESS_SEND_ATTEMPT: &str = "egress_send_attempt";
pub const EGRESS_SEND_OK: &str = "egress_send_ok";
pub const EGRESS_SEND_FAILED: &str = "egress_send_failed";
pub const EGRESS_RECV_CLOSED: &str = "egress_recv_closed";
pub const EGRESS_WORKER_CREATE: &str = "egress_worker_create";
pub const EGRESS_WORKER_REUSE: &str = "egress_worker_reuse";
pub const EGRESS_WORKER_REMOVE: &str = "egress_worker_remove";
pub const EGRESS_DETACH_UNKNOWN: &str = "egress_detach_unknown";

// Ingress events.
pub const INGRESS_RECEIVE: &str = "ingress_receive";
pub const INGRESS_DISPATCH_FAILED: &str = "ingress_dispatch_failed";
pub const INGRESS_REJECT_AFTER_CLOSE: &str = "ingress_reject_after_close";

// Stream lifecycle events.
pub const STREAM_CREATE: &str = "stream_create";
pub const STREAM_GET_WRITERS: &str = "stream_get_writers";
pub const STREAM_GET_READER: &str = "stream_get_reader";
pub const STREAM_BLOCK_RECEIVED: &str = "stream_block_received";
pub const STREAM_CLOSE_RECEIVED: &str = "stream_close_received";
pub const STREAM_CLOSE_START: &str = "stream_close_start";
pub const STREAM_CLOSE_WAIT_ACKS: &str = "stream_close_wait_acks";
pub const STREAM_CLOSE_SINK_FAILED: &str = "stream_close_sink_failed";
pub const STREAM_ALL_CLOSED: &str = "stream_all_closed";
pub const STREAM_CLOSE_OK: &str = "stream_close_ok";
pub const STREAM_RELEASE: &str = "stream_release";
pub const STREAM_DROPPED_OPEN: &str = "stream_dropped_open";

// Writer events.
pub const WRITER_FLUSH: &str = "writer_flush";
pub const WRITER_CLOSE_FAILED: &str = "writer_close_failed";

// Runtime events.
pub const RUNTIME_SPAWN_START: &str = "runtime_spawn_start";
pub const RUNTIME_SPAWN_OK: &str = "runtime_spawn_ok";
pub const RUNTIME_SPAWN_FAILED: &str = "runtime_spawn_failed";
pub const RUNTIME_BUILD_FAILED: &str = "runtime_build_failed";
