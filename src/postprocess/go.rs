//! Go output fixups: well-known types come from protobuf-go-lite

const LITE_ROOT: &str = "github.com/aperturerobotics/protobuf-go-lite";

/// Upstream import path and its lite replacement
pub const WELL_KNOWN_IMPORTS: [(&str, &str); 8] = [
    (
        "google.golang.org/protobuf/types/known/anypb",
        "types/known/anypb",
    ),
    (
        "google.golang.org/protobuf/types/known/durationpb",
        "types/known/durationpb",
    ),
    (
        "google.golang.org/protobuf/types/known/emptypb",
        "types/known/emptypb",
    ),
    (
        "google.golang.org/protobuf/types/known/fieldmaskpb",
        "types/known/fieldmaskpb",
    ),
    (
        "google.golang.org/protobuf/types/known/structpb",
        "types/known/structpb",
    ),
    (
        "google.golang.org/protobuf/types/known/timestamppb",
        "types/known/timestamppb",
    ),
    (
        "google.golang.org/protobuf/types/known/wrapperspb",
        "types/known/wrapperspb",
    ),
    (
        "google.golang.org/protobuf/types/descriptorpb",
        "types/descriptorpb",
    ),
];

/// Replace quoted well-known-type import paths
pub fn rewrite(content: &str) -> String {
    let mut out = content.to_string();
    for (upstream, lite) in WELL_KNOWN_IMPORTS {
        let from = format!("\"{}\"", upstream);
        if out.contains(&from) {
            out = out.replace(&from, &format!("\"{}/{}\"", LITE_ROOT, lite));
        }
    }
    out
}
