fn main() -> Result<(), Box<dyn std::error::Error>> {
    let method = |name: &str, route: &str, input: &str, output: &str| {
        tonic_build::manual::Method::builder()
            .name(name)
            .route_name(route)
            .input_type(format!("crate::rpc::{}", input))
            .output_type(format!("crate::rpc::{}", output))
            .codec_path("tonic::codec::ProstCodec")
            .build()
    };

    // Messages are declared in src/rpc.rs, so no .proto compiler is needed
    let service = tonic_build::manual::Service::builder()
        .name("BuildAgent")
        .package("buildagent")
        .method(method(
            "enqueue_build",
            "EnqueueBuild",
            "EnqueueBuildRequest",
            "EnqueueBuildResponse",
        ))
        .method(method(
            "get_build_status",
            "GetBuildStatus",
            "GetBuildStatusRequest",
            "BuildStatusResponse",
        ))
        .method(method(
            "list_builds",
            "ListBuilds",
            "ListBuildsRequest",
            "ListBuildsResponse",
        ))
        .method(method(
            "cancel_build",
            "CancelBuild",
            "CancelBuildRequest",
            "BuildStatusResponse",
        ))
        .build();

    tonic_build::manual::Builder::new().compile(&[service]);
    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
