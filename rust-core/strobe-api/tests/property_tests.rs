// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// Property tests for the HTTP surface.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use proptest::prelude::*;
use strobe_api::{build_router, AppState, Transport};
use strobe_shard::{Shard, ShardConfig, ShardHealth};
use strobe_wire::QUERY_FRAME_LEN;
use tower::ServiceExt;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any body that is not exactly one frame long is a client error and
    /// never changes shard health.
    #[test]
    fn wrong_length_frames_are_bad_requests(
        body in prop::collection::vec(any::<u8>(), 0..2048)
            .prop_filter("not a frame", |b| b.len() != QUERY_FRAME_LEN)
    ) {
        let dir = tempfile::tempdir().unwrap();
        let shard = Arc::new(Shard::open(ShardConfig::new(dir.path())).unwrap());
        let app = build_router(AppState::new(Arc::clone(&shard), 8, Transport::H1).unwrap());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let status = runtime.block_on(async {
            let request = Request::builder()
                .method("POST")
                .uri("/search")
                .body(Body::from(body))
                .unwrap();
            app.oneshot(request).await.unwrap().status()
        });

        prop_assert_eq!(status, StatusCode::BAD_REQUEST);
        prop_assert_eq!(shard.health(), ShardHealth::Serving);
    }

    /// Frame-length bodies are either answered or rejected for their flags
    /// or `k`; the server never fails on them.
    #[test]
    fn frame_length_bodies_never_fail_server_side(
        body in prop::collection::vec(any::<u8>(), QUERY_FRAME_LEN)
    ) {
        let dir = tempfile::tempdir().unwrap();
        let shard = Arc::new(Shard::open(ShardConfig::new(dir.path())).unwrap());
        let app = build_router(AppState::new(shard, 8, Transport::H1).unwrap());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let status = runtime.block_on(async {
            let request = Request::builder()
                .method("POST")
                .uri("/search")
                .body(Body::from(body))
                .unwrap();
            app.oneshot(request).await.unwrap().status()
        });

        prop_assert!(status == StatusCode::OK || status == StatusCode::BAD_REQUEST);
    }
}
