// Container Runner
// Builds `docker build` / `docker run` invocations for container steps

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Where a container step's image comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerImage {
    /// Pulled by docker on demand
    Registry(String),
    /// Built locally from a Dockerfile, then run by `tag`
    Dockerfile {
        path: PathBuf,
        context: PathBuf,
        tag: String,
    },
}

impl DockerImage {
    pub fn parse(image: &str) -> Self {
        if !image_needs_build(image) {
            return DockerImage::Registry(image.to_string());
        }
        let path = PathBuf::from(image);
        let context = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let digest = Sha256::digest(image.as_bytes());
        let tag = format!("gantry-{}", &hex(&digest)[..12]);
        DockerImage::Dockerfile { path, context, tag }
    }

    /// Name to pass to `docker run`
    pub fn run_name(&self) -> &str {
        match self {
            DockerImage::Registry(name) => name,
            DockerImage::Dockerfile { tag, .. } => tag,
        }
    }
}

/// `Dockerfile` or any path ending in `Dockerfile` is built rather than pulled
pub fn image_needs_build(image: &str) -> bool {
    image == "Dockerfile" || image.ends_with("/Dockerfile") || image.ends_with(".Dockerfile")
}

pub fn docker_build_args(path: &Path, context: &Path, tag: &str) -> Vec<String> {
    vec![
        "build".to_string(),
        "-t".to_string(),
        tag.to_string(),
        "-f".to_string(),
        path.to_string_lossy().to_string(),
        context.to_string_lossy().to_string(),
    ]
}

/// Arguments for `docker run`.
///
/// Env values are passed by name only (`-e KEY`); the docker process itself
/// carries the values so secrets never appear on the command line.
pub fn docker_run_args<'a>(
    image: &str,
    entrypoint: Option<&str>,
    args: &[String],
    mounts: &[String],
    working_dir: Option<&str>,
    env_names: impl IntoIterator<Item = &'a String>,
) -> Vec<String> {
    let mut out = vec!["run".to_string(), "--rm".to_string()];

    for name in env_names {
        out.push("-e".to_string());
        out.push(name.clone());
    }
    for mount in mounts {
        out.push("-v".to_string());
        out.push(mount.clone());
    }
    if let Some(dir) = working_dir {
        out.push("-w".to_string());
        out.push(dir.to_string());
    }
    if let Some(entrypoint) = entrypoint.filter(|e| !e.is_empty()) {
        out.push("--entrypoint".to_string());
        out.push(entrypoint.to_string());
    }

    out.push(image.to_string());
    out.extend(args.iter().cloned());
    out
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_needs_build() {
        assert!(image_needs_build("Dockerfile"));
        assert!(image_needs_build("/actions/hello/Dockerfile"));
        assert!(image_needs_build("build/app.Dockerfile"));
        assert!(!image_needs_build("alpine:3.19"));
        assert!(!image_needs_build("ghcr.io/org/Dockerfile-tools:1"));
    }

    #[test]
    fn test_parse_dockerfile_image() {
        match DockerImage::parse("/actions/hello/Dockerfile") {
            DockerImage::Dockerfile { path, context, tag } => {
                assert_eq!(path, PathBuf::from("/actions/hello/Dockerfile"));
                assert_eq!(context, PathBuf::from("/actions/hello"));
                assert!(tag.starts_with("gantry-"));
                assert_eq!(tag.len(), "gantry-".len() + 12);
            }
            other => panic!("expected a build, got {:?}", other),
        }

        let bare = DockerImage::parse("Dockerfile");
        assert!(matches!(bare, DockerImage::Dockerfile { ref context, .. } if context == Path::new(".")));
        assert_eq!(DockerImage::parse("node:20").run_name(), "node:20");
    }

    #[test]
    fn test_docker_run_args() {
        let env = vec!["INPUT_NAME".to_string(), "GITHUB_ENV".to_string()];
        let args = docker_run_args(
            "alpine:3",
            Some("/entry.sh"),
            &["hello".to_string()],
            &["/ws:/github/workspace".to_string()],
            Some("/github/workspace"),
            &env,
        );
        assert_eq!(
            args,
            vec![
                "run", "--rm", "-e", "INPUT_NAME", "-e", "GITHUB_ENV", "-v", "/ws:/github/workspace",
                "-w", "/github/workspace", "--entrypoint", "/entry.sh", "alpine:3", "hello",
            ]
        );
    }

    #[test]
    fn test_docker_build_args() {
        let args = docker_build_args(Path::new("a/Dockerfile"), Path::new("a"), "gantry-x");
        assert_eq!(args, vec!["build", "-t", "gantry-x", "-f", "a/Dockerfile", "a"]);
    }
}
