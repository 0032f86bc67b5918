//! Integration tests for protogen

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn protogen() -> Command {
        cargo_bin_cmd!("protogen")
    }

    #[test]
    fn help_displays() {
        protogen()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("protobuf code generation"));
    }

    #[test]
    fn version_displays() {
        protogen()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("protogen"));
    }

    #[test]
    fn generate_help_lists_flags() {
        protogen()
            .args(["generate", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--targets"))
            .stdout(predicate::str::contains("--no-deps"));
    }

    #[test]
    fn clean_empty_project() {
        let dir = TempDir::new().unwrap();
        protogen()
            .args(["clean", "-C"])
            .arg(dir.path())
            .env("CI", "1")
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing to clean"));
    }

    #[test]
    fn generate_without_go_mod_fails() {
        let dir = TempDir::new().unwrap();
        protogen()
            .args(["generate", "--no-deps", "-C"])
            .arg(dir.path())
            .env("CI", "1")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn generate_missing_project_dir_fails() {
        protogen()
            .args(["gen", "--no-deps", "-C", "/nonexistent/protogen-project"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn deps_without_tools_dir_fails() {
        let dir = TempDir::new().unwrap();
        protogen()
            .args(["deps", "-C"])
            .arg(dir.path())
            .env("CI", "1")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn invalid_project_config_fails() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".protogen.toml"), "[generate\n").unwrap();
        protogen()
            .args(["clean", "-C"])
            .arg(dir.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains(".protogen.toml"));
    }
}

/// Pipeline properties, driven through the library with a fake compiler
#[cfg(unix)]
mod pipeline_tests {
    use async_trait::async_trait;
    use protogen::cache::Cache;
    use protogen::config::{CleanConfig, GenerateConfig};
    use protogen::generator::{clean, CompileRequest, Compiler, Generator};
    use protogen::ProtogenResult;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    const MODULE: &str = "example.com/m";

    /// Writes `<name>.pb.go` next to each input and counts its runs
    #[derive(Clone)]
    struct FakeCompiler {
        project_dir: PathBuf,
        runs: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl FakeCompiler {
        fn new(project_dir: &Path) -> Self {
            Self {
                project_dir: project_dir.to_path_buf(),
                runs: Arc::default(),
            }
        }

        fn runs(&self) -> Vec<Vec<String>> {
            self.runs.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Compiler for FakeCompiler {
        async fn compile(
            &self,
            request: &CompileRequest,
            _cancel: &CancellationToken,
        ) -> ProtogenResult<()> {
            for proto in &request.proto_files {
                let stem = proto.trim_end_matches(".proto");
                fs::write(
                    self.project_dir.join(format!("{}.pb.go", stem)),
                    "package generated\n",
                )
                .unwrap();
            }
            self.runs.lock().unwrap().push(request.proto_files.clone());
            Ok(())
        }
    }

    struct Project {
        dir: TempDir,
        compiler: FakeCompiler,
    }

    impl Project {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("go.mod"), format!("module {}\n", MODULE)).unwrap();
            let compiler = FakeCompiler::new(dir.path());
            Self { dir, compiler }
        }

        fn path(&self) -> &Path {
            self.dir.path()
        }

        fn write(&self, rel: &str, content: &str) {
            let path = self.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        fn config(&self) -> GenerateConfig {
            GenerateConfig {
                project_dir: Some(self.path().to_path_buf()),
                targets: ["a/*.proto", "b/*.proto", "pkg/*.proto"]
                    .map(String::from)
                    .to_vec(),
                ..Default::default()
            }
        }

        async fn generate_with(&self, config: GenerateConfig) -> protogen::generator::GenerateSummary {
            let mut generator = Generator::with_compiler(config, Box::new(self.compiler.clone()))
                .await
                .unwrap();
            generator.generate(&CancellationToken::new()).await.unwrap()
        }

        async fn generate(&self) -> protogen::generator::GenerateSummary {
            self.generate_with(self.config()).await
        }

        async fn cache(&self) -> Cache {
            Cache::load(&self.path().join(".protoc-manifest.json")).await
        }
    }

    fn key(dir: &str) -> String {
        format!("{}/{}", MODULE, dir)
    }

    #[tokio::test]
    async fn second_run_compiles_nothing() {
        let project = Project::new();
        project.write("a/x.proto", "syntax = \"proto3\";\n");
        project.write("b/y.proto", "syntax = \"proto3\";\n");

        let first = project.generate().await;
        assert_eq!(first.regenerated, vec![key("a"), key("b")]);

        let second = project.generate().await;
        assert!(!second.compiled());
        assert_eq!(second.skipped, 2);
        assert_eq!(project.compiler.runs().len(), 1);
    }

    #[tokio::test]
    async fn byte_change_regenerates_only_that_package() {
        let project = Project::new();
        project.write("a/x.proto", "syntax = \"proto3\";\n");
        project.write("b/y.proto", "syntax = \"proto3\";\n");
        project.generate().await;

        project.write("a/x.proto", "syntax = \"proto3\";\nmessage X {}\n");
        let summary = project.generate().await;

        assert_eq!(summary.regenerated, vec![key("a")]);
        assert_eq!(summary.skipped, 1);
        assert_eq!(project.compiler.runs()[1], vec!["a/x.proto"]);
    }

    #[tokio::test]
    async fn rename_regenerates_package() {
        let project = Project::new();
        project.write("a/x.proto", "syntax = \"proto3\";\n");
        project.generate().await;

        fs::rename(project.path().join("a/x.proto"), project.path().join("a/z.proto")).unwrap();
        let summary = project.generate().await;

        assert_eq!(summary.regenerated, vec![key("a")]);
        let cache = project.cache().await;
        assert_eq!(cache.packages[&key("a")].proto_files, vec!["a/z.proto"]);
    }

    #[tokio::test]
    async fn flag_change_regenerates_everything() {
        let project = Project::new();
        project.write("a/x.proto", "syntax = \"proto3\";\n");
        project.write("b/y.proto", "syntax = \"proto3\";\n");
        project.generate().await;

        let mut config = project.config();
        config.extra_args = vec!["--experimental_allow_proto3_optional".to_string()];
        let summary = project.generate_with(config.clone()).await;
        assert_eq!(summary.regenerated.len(), 2);

        let again = project.generate_with(config).await;
        assert!(!again.compiled());
    }

    #[tokio::test]
    async fn force_regenerates_everything() {
        let project = Project::new();
        project.write("a/x.proto", "syntax = \"proto3\";\n");
        project.generate().await;

        let mut config = project.config();
        config.force = true;
        let summary = project.generate_with(config).await;

        assert_eq!(summary.regenerated, vec![key("a")]);
        assert_eq!(project.compiler.runs().len(), 2);
    }

    #[tokio::test]
    async fn removed_package_is_swept_from_cache() {
        let project = Project::new();
        project.write("a/x.proto", "syntax = \"proto3\";\n");
        project.write("b/y.proto", "syntax = \"proto3\";\n");
        project.generate().await;

        fs::remove_file(project.path().join("b/y.proto")).unwrap();
        let summary = project.generate().await;

        assert!(!summary.compiled());
        let cache = project.cache().await;
        assert!(cache.packages.contains_key(&key("a")));
        assert!(!cache.packages.contains_key(&key("b")));
    }

    #[tokio::test]
    async fn clean_removes_generated_and_tolerates_missing() {
        let project = Project::new();
        project.write("a/x.proto", "syntax = \"proto3\";\n");
        project.write("b/y.proto", "syntax = \"proto3\";\n");
        project.generate().await;

        fs::remove_file(project.path().join("b/y.pb.go")).unwrap();
        let summary = clean(&CleanConfig {
            project_dir: Some(project.path().to_path_buf()),
            ..Default::default()
        })
        .await
        .unwrap();

        assert!(summary.cache_removed);
        assert_eq!(summary.files_removed, 1);
        assert_eq!(summary.files_missing, 1);
        assert!(!project.path().join("a/x.pb.go").exists());
        assert!(!project.path().join(".protoc-manifest.json").exists());
        assert!(project.path().join("a/x.proto").exists());
    }

    #[tokio::test]
    async fn single_file_scenario() {
        let project = Project::new();
        project.write("pkg/a.proto", "syntax = \"proto3\";\npackage pkg;\n");

        let summary = project.generate().await;
        assert_eq!(summary.discovered, 1);
        assert_eq!(summary.regenerated, vec![key("pkg")]);
        assert_eq!(summary.generated_files, vec!["pkg/a.pb.go"]);

        let cache = project.cache().await;
        let info = &cache.packages[&key("pkg")];
        assert_eq!(info.proto_files, vec!["pkg/a.proto"]);
        assert_eq!(info.generated_files, vec!["pkg/a.pb.go"]);
        assert_eq!(info.hash.len(), 64);
        assert!(!cache.protoc_flags_hash.is_empty());

        // The staging link is gone after the run
        assert!(fs::symlink_metadata(project.path().join("vendor").join(MODULE)).is_err());
    }

    #[tokio::test]
    async fn version_one_cache_is_ignored() {
        let project = Project::new();
        project.write("pkg/a.proto", "syntax = \"proto3\";\n");
        project.write(
            ".protoc-manifest.json",
            &format!(
                r#"{{"version":1,"packages":{{"{}":{{"hash":"x","generatedFiles":[],"protoFiles":["pkg/a.proto"]}}}}}}"#,
                key("pkg")
            ),
        );

        let summary = project.generate().await;
        assert_eq!(summary.regenerated, vec![key("pkg")]);
        assert_eq!(project.cache().await.version, protogen::cache::CACHE_VERSION);
    }
}
