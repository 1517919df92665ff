#[cfg(test)]
mod tests {
    use kodegen_bundler_package::archive::ARCHIVE_NAME;
    use kodegen_bundler_package::context::RunContext;
    use kodegen_bundler_package::error::Error;
    use kodegen_bundler_package::hooks::hook_fn;
    use kodegen_bundler_package::options::{
        ArchiveOptions, ExtendInfo, MacOptions, Protocol, SignOptions, StagingMode,
    };
    use kodegen_bundler_package::prune::{NodeModulesResolver, Pruner};
    use kodegen_bundler_package::resedit::{ResourceEdit, ResourceEditor};
    use kodegen_bundler_package::sign::{SignRequest, Signer};
    use kodegen_bundler_package::{
        Arch, BoxFuture, Collaborators, DirectoryTemplateProvider, Hooks, OptionsBuilder,
        Packager, Platform, Target, Warning,
    };
    use plist::Value;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Records every edit instead of running an external tool.
    #[derive(Clone, Default)]
    struct RecordingEditor {
        edits: Arc<Mutex<Vec<(PathBuf, ResourceEdit)>>>,
    }

    impl ResourceEditor for RecordingEditor {
        fn edit<'a>(
            &'a self,
            exe: &'a Path,
            edit: &'a ResourceEdit,
        ) -> BoxFuture<'a, kodegen_bundler_package::Result<()>> {
            Box::pin(async move {
                self.edits
                    .lock()
                    .unwrap()
                    .push((exe.to_path_buf(), edit.clone()));
                Ok(())
            })
        }
    }

    struct FailingSigner;

    impl Signer for FailingSigner {
        fn sign<'a>(
            &'a self,
            _request: &'a SignRequest,
        ) -> BoxFuture<'a, kodegen_bundler_package::Result<()>> {
            Box::pin(async { Err(Error::Sign("no identity".into())) })
        }
    }

    struct Workspace {
        root: TempDir,
    }

    impl Workspace {
        fn new() -> Self {
            let workspace = Self {
                root: tempfile::tempdir().unwrap(),
            };
            workspace.write_app();
            workspace.write_win32_template();
            workspace.write_linux_template();
            workspace.write_mac_template();
            workspace
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.root.path().join(rel)
        }

        fn write(&self, rel: &str, contents: &str) {
            let path = self.path(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }

        fn write_app(&self) {
            self.write(
                "app/package.json",
                r#"{
                    "name": "foo",
                    "version": "1.2.3",
                    "dependencies": { "dep": "^1.0.0" },
                    "devDependencies": { "devdep": "^1.0.0", "electron": "30.0.0" }
                }"#,
            );
            self.write("app/index.js", "console.log('hi')");
            self.write("app/test/spec.js", "");
            self.write(
                "app/node_modules/dep/package.json",
                r#"{ "name": "dep", "version": "1.0.0" }"#,
            );
            self.write("app/node_modules/dep/index.js", "");
            self.write(
                "app/node_modules/devdep/package.json",
                r#"{ "name": "devdep", "version": "1.0.0" }"#,
            );
        }

        fn write_win32_template(&self) {
            self.write("templates/win32-x64/electron.exe", "MZ");
            self.write("templates/win32-x64/resources/default_app.archive", "default");
        }

        fn write_linux_template(&self) {
            self.write("templates/linux-x64/electron", "ELF");
            self.write("templates/linux-x64/resources/default_app/main.js", "");
        }

        fn write_mac_template(&self) {
            let contents = "templates/darwin-x64/Electron.app/Contents";
            self.write(&format!("{contents}/MacOS/Electron"), "MACHO");
            self.write(&format!("{contents}/Resources/default_app.archive"), "default");
            write_info_plist(&self.path(&format!("{contents}/Info.plist")), "Electron");

            for suffix in ["", " EH", " NP"] {
                let helper_name = format!("Electron Helper{suffix}");
                let helper = format!("{contents}/Frameworks/{helper_name}.app/Contents");
                self.write(&format!("{helper}/MacOS/{helper_name}"), "MACHO");
                write_info_plist(&self.path(&format!("{helper}/Info.plist")), &helper_name);
            }
        }

        fn builder(&self, platform: Platform) -> OptionsBuilder {
            OptionsBuilder::new(self.path("app"))
                .name("Foo")
                .runtime_version("30.0.0")
                .platforms(vec![platform])
                .arches(vec![Arch::X64])
                .out(self.path("out"))
                .staging(StagingMode::Ephemeral {
                    root: Some(self.path("staging")),
                })
        }

        fn collaborators(&self) -> Collaborators {
            Collaborators::new(DirectoryTemplateProvider::new(self.path("templates")))
                .with_resource_editor(RecordingEditor::default())
        }
    }

    fn write_info_plist(path: &Path, executable: &str) {
        let mut dict = plist::Dictionary::new();
        dict.insert("CFBundleExecutable".into(), executable.into());
        dict.insert("CFBundleIdentifier".into(), "com.github.Electron".into());
        dict.insert("CFBundleIconFile".into(), "electron.icns".into());
        dict.insert("LSMinimumSystemVersion".into(), "10.13".into());
        Value::Dictionary(dict).to_file_xml(path).unwrap();
    }

    fn read_info(path: &Path) -> plist::Dictionary {
        Value::from_file(path).unwrap().into_dictionary().unwrap()
    }

    fn string_of<'d>(dict: &'d plist::Dictionary, key: &str) -> Option<&'d str> {
        dict.get(key).and_then(Value::as_string)
    }

    fn archive_entries(path: &Path) -> Vec<String> {
        let mut archive = tar::Archive::new(fs::File::open(path).unwrap());
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                entry
                    .unwrap()
                    .path()
                    .unwrap()
                    .to_string_lossy()
                    .trim_end_matches('/')
                    .to_string()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_win32_archive_with_pruning() {
        let ws = Workspace::new();
        let editor = RecordingEditor::default();
        let options = ws
            .builder(Platform::Win32)
            .prune(true)
            .archive(ArchiveOptions::default())
            .build()
            .unwrap();
        let collaborators = ws.collaborators().with_resource_editor(editor.clone());

        let report = Packager::new(options, collaborators).package().await.unwrap();

        let bundle = ws.path("out/Foo-win32-x64");
        assert_eq!(report.paths(), vec![bundle.clone()]);
        assert!(bundle.join("Foo.exe").is_file());
        assert!(!bundle.join("electron.exe").exists());
        assert!(bundle.join("resources").join(ARCHIVE_NAME).is_file());
        assert!(!bundle.join("resources/app").exists());
        assert!(!bundle.join("resources/default_app.archive").exists());

        let entries = archive_entries(&bundle.join("resources").join(ARCHIVE_NAME));
        assert!(entries.contains(&"index.js".to_string()));
        assert!(entries.contains(&"node_modules/dep/package.json".to_string()));
        assert!(!entries.iter().any(|e| e.starts_with("node_modules/devdep")));

        let edits = editor.edits.lock().unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].0, bundle.join("Foo.exe"));
        assert_eq!(edits[0].1.product_version.as_deref(), Some("1.2.3"));
    }

    #[tokio::test]
    async fn test_prebuilt_archive_ignores_source_options() {
        let ws = Workspace::new();
        ws.write("prebuilt/app.archive", "prebuilt payload \u{0} bytes");
        let options = ws
            .builder(Platform::Linux)
            .prebuilt_archive(ws.path("prebuilt/app.archive"))
            .ignore(["^/test"])
            .build()
            .unwrap();

        let report = Packager::new(options, ws.collaborators())
            .package()
            .await
            .unwrap();

        let target = Target::new(Platform::Linux, Arch::X64);
        assert_eq!(
            report.warnings,
            vec![Warning::IgnoredOption {
                target,
                option: "ignore"
            }]
        );
        let bundle = ws.path("out/Foo-linux-x64");
        assert_eq!(
            fs::read(bundle.join("resources").join(ARCHIVE_NAME)).unwrap(),
            fs::read(ws.path("prebuilt/app.archive")).unwrap()
        );
        assert!(bundle.join("Foo").is_file());
        assert!(!bundle.join("resources/app").exists());
        assert!(!bundle.join("resources/default_app").exists());
    }

    #[tokio::test]
    async fn test_mac_protocols_are_merged() {
        let ws = Workspace::new();
        let options = ws
            .builder(Platform::Darwin)
            .mac(MacOptions {
                protocols: vec![
                    Protocol::new("Foo Link", vec!["foo".into()]),
                    Protocol::new("Foo Link", vec!["foo-dev".into(), "foo".into()]),
                ],
                sign: Some(SignOptions {
                    identity: "-".into(),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .build()
            .unwrap();
        let collaborators = ws.collaborators().with_signer(FailingSigner);

        let report = Packager::new(options, collaborators).package().await.unwrap();

        let app = ws.path("out/Foo-darwin-x64/Foo.app");
        let info = Value::from_file(app.join("Contents/Info.plist"))
            .unwrap()
            .into_dictionary()
            .unwrap();
        let url_types = info.get("CFBundleURLTypes").unwrap().as_array().unwrap();
        assert_eq!(url_types.len(), 1);
        let entry = url_types[0].as_dictionary().unwrap();
        assert_eq!(
            entry.get("CFBundleURLName").and_then(Value::as_string),
            Some("Foo Link")
        );
        let schemes: Vec<&str> = entry
            .get("CFBundleURLSchemes")
            .and_then(Value::as_array)
            .unwrap()
            .iter()
            .filter_map(Value::as_string)
            .collect();
        assert_eq!(schemes, vec!["foo", "foo-dev"]);
        assert_eq!(
            info.get("CFBundleIdentifier").and_then(Value::as_string),
            Some("com.electron.foo")
        );
        assert_eq!(
            info.get("CFBundleShortVersionString").and_then(Value::as_string),
            Some("1.2.3")
        );

        assert!(app.join("Contents/MacOS/Foo").is_file());
        let helper = app.join("Contents/Frameworks/Foo Helper.app/Contents");
        assert!(helper.join("MacOS/Foo Helper").is_file());
        let helper_info = Value::from_file(helper.join("Info.plist"))
            .unwrap()
            .into_dictionary()
            .unwrap();
        assert_eq!(
            helper_info.get("CFBundleIdentifier").and_then(Value::as_string),
            Some("com.electron.foo.helper")
        );

        assert!(matches!(
            report.warnings.as_slice(),
            [Warning::SigningFailed { .. }]
        ));
    }

    #[tokio::test]
    async fn test_mac_archive_integrity() {
        let ws = Workspace::new();
        let options = ws
            .builder(Platform::Darwin)
            .archive(ArchiveOptions::default())
            .build()
            .unwrap();

        Packager::new(options, ws.collaborators())
            .package()
            .await
            .unwrap();

        let contents = ws.path("out/Foo-darwin-x64/Foo.app/Contents");
        let archive = contents.join("Resources").join(ARCHIVE_NAME);
        let expected = kodegen_bundler_package::archive::sha256_hex(&archive)
            .await
            .unwrap();
        let info = Value::from_file(contents.join("Info.plist"))
            .unwrap()
            .into_dictionary()
            .unwrap();
        let hash = info
            .get("ElectronAsarIntegrity")
            .and_then(Value::as_dictionary)
            .and_then(|d| d.get("Resources/app.archive"))
            .and_then(Value::as_dictionary)
            .and_then(|d| d.get("hash"))
            .and_then(Value::as_string);
        assert_eq!(hash, Some(expected.as_str()));
    }

    #[tokio::test]
    async fn test_mac_metadata_helpers_and_resources() {
        let ws = Workspace::new();
        let mut extend = plist::Dictionary::new();
        extend.insert("LSMinimumSystemVersion".into(), "11.0".into());
        extend.insert("NSSupportsAutomaticGraphicsSwitching".into(), true.into());
        extend.insert("CFBundleName".into(), "Overridden".into());
        Value::Dictionary(extend)
            .to_file_xml(ws.path("extend.plist"))
            .unwrap();
        ws.write("extras/LICENSE.txt", "MIT");
        ws.write("extras/data/config.json", "{}");

        let options = ws
            .builder(Platform::Darwin)
            .build_version("42")
            .icon(ws.path("icons/missing.png"))
            .extra_resource(ws.path("extras/LICENSE.txt"))
            .extra_resource(ws.path("extras/data"))
            .mac(MacOptions {
                extend_info: Some(ExtendInfo::Path(ws.path("extend.plist"))),
                ..Default::default()
            })
            .build()
            .unwrap();

        let report = Packager::new(options, ws.collaborators())
            .package()
            .await
            .unwrap();

        let contents = ws.path("out/Foo-darwin-x64/Foo.app/Contents");
        let info = read_info(&contents.join("Info.plist"));
        assert_eq!(string_of(&info, "LSMinimumSystemVersion"), Some("11.0"));
        assert_eq!(
            info.get("NSSupportsAutomaticGraphicsSwitching")
                .and_then(Value::as_boolean),
            Some(true)
        );
        assert_eq!(string_of(&info, "CFBundleName"), Some("Foo"));
        assert_eq!(string_of(&info, "CFBundleShortVersionString"), Some("1.2.3"));
        assert_eq!(string_of(&info, "CFBundleVersion"), Some("42"));

        let frameworks = contents.join("Frameworks");
        for (suffix, id) in [
            ("", "com.electron.foo.helper"),
            (" EH", "com.electron.foo.helper.EH"),
            (" NP", "com.electron.foo.helper.NP"),
        ] {
            let helper = frameworks.join(format!("Foo Helper{suffix}.app/Contents"));
            assert!(helper.join(format!("MacOS/Foo Helper{suffix}")).is_file(), "{suffix}");
            let helper_info = read_info(&helper.join("Info.plist"));
            assert_eq!(string_of(&helper_info, "CFBundleIdentifier"), Some(id));
            assert_eq!(
                string_of(&helper_info, "CFBundleExecutable"),
                Some(format!("Foo Helper{suffix}").as_str())
            );
            assert!(!frameworks.join(format!("Electron Helper{suffix}.app")).exists());
        }

        let resources = contents.join("Resources");
        assert_eq!(fs::read_to_string(resources.join("LICENSE.txt")).unwrap(), "MIT");
        assert!(resources.join("data/config.json").is_file());

        assert_eq!(
            report.warnings,
            vec![Warning::MissingIcon {
                target: Target::new(Platform::Darwin, Arch::X64),
                path: ws.path("icons/missing.icns"),
            }]
        );
    }

    #[tokio::test]
    async fn test_icons_are_resolved_per_platform() {
        let ws = Workspace::new();
        ws.write("icons/foo.icns", "ICNS");
        ws.write("icons/foo.ico", "ICO");
        let editor = RecordingEditor::default();

        let options = ws
            .builder(Platform::Darwin)
            .platforms(vec![Platform::Darwin, Platform::Win32])
            .icon(ws.path("icons/foo.png"))
            .build()
            .unwrap();
        let collaborators = ws.collaborators().with_resource_editor(editor.clone());
        let report = Packager::new(options, collaborators).package().await.unwrap();

        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        let icns = ws.path("out/Foo-darwin-x64/Foo.app/Contents/Resources/electron.icns");
        assert_eq!(fs::read_to_string(icns).unwrap(), "ICNS");
        let edits = editor.edits.lock().unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].1.icon, Some(ws.path("icons/foo.ico")));
    }

    #[tokio::test]
    async fn test_failed_run_keeps_staging_area() {
        let ws = Workspace::new();
        let hooks = Hooks {
            after_copy: vec![hook_fn(|_| async { Err::<(), _>(anyhow::anyhow!("boom")) })],
            ..Default::default()
        };
        let options = ws.builder(Platform::Linux).hooks(hooks).build().unwrap();

        let err = Packager::new(options, ws.collaborators())
            .package()
            .await
            .unwrap_err();
        assert_eq!(err.category(), "hook");

        let left: Vec<PathBuf> = fs::read_dir(ws.path("staging"))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(left.len(), 1);
        let staged = left[0].join("Foo-linux-x64");
        assert!(staged.join("electron").is_file());
        assert!(staged.join("resources/app/index.js").is_file());
    }

    #[tokio::test]
    async fn test_successful_run_cleans_staging_area() {
        let ws = Workspace::new();
        let options = ws.builder(Platform::Linux).build().unwrap();

        Packager::new(options, ws.collaborators())
            .package()
            .await
            .unwrap();

        assert_eq!(fs::read_dir(ws.path("staging")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_existing_output_requires_overwrite() {
        let ws = Workspace::new();
        ws.write("out/Foo-linux-x64/stale.txt", "old");

        let options = ws.builder(Platform::Linux).build().unwrap();
        let err = Packager::new(options, ws.collaborators())
            .package()
            .await
            .unwrap_err();
        assert_eq!(err.category(), "staging");
        assert!(ws.path("out/Foo-linux-x64/stale.txt").exists());

        let options = ws.builder(Platform::Linux).overwrite(true).build().unwrap();
        Packager::new(options, ws.collaborators())
            .package()
            .await
            .unwrap();
        let bundle = ws.path("out/Foo-linux-x64");
        assert!(!bundle.join("stale.txt").exists());
        assert!(bundle.join("resources/app/index.js").is_file());
    }

    #[tokio::test]
    async fn test_ignore_patterns_and_pruning_without_archive() {
        let ws = Workspace::new();
        let options = ws
            .builder(Platform::Linux)
            .ignore(["^/test($|/)"])
            .staging(StagingMode::Fixed)
            .build()
            .unwrap();

        Packager::new(options, ws.collaborators())
            .package()
            .await
            .unwrap();

        let app = ws.path("out/Foo-linux-x64/resources/app");
        assert!(app.join("index.js").is_file());
        assert!(app.join("package.json").is_file());
        assert!(!app.join("test").exists());
        assert!(app.join("node_modules/dep/index.js").is_file());
        assert!(!app.join("node_modules/devdep").exists());
    }

    #[tokio::test]
    async fn test_hooks_run_in_phase_order() {
        let ws = Workspace::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = |label: &'static str| {
            let seen = Arc::clone(&seen);
            hook_fn(move |args| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().unwrap().push((label, args.path));
                    anyhow::Ok(())
                }
            })
        };
        let hooks = Hooks {
            after_extract: vec![record("extract")],
            after_copy: vec![record("copy-1"), record("copy-2")],
            after_prune: vec![record("prune")],
            after_complete: vec![record("complete")],
        };
        let options = ws.builder(Platform::Linux).hooks(hooks).build().unwrap();

        Packager::new(options, ws.collaborators())
            .package()
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        let labels: Vec<&str> = seen.iter().map(|(label, _)| *label).collect();
        assert_eq!(labels, vec!["extract", "copy-1", "copy-2", "prune", "complete"]);
        assert_eq!(seen[4].1, ws.path("out/Foo-linux-x64"));
        assert!(seen[1].1.ends_with("resources/app"));
    }

    #[tokio::test]
    async fn test_failing_hook_aborts_target() {
        let ws = Workspace::new();
        let hooks = Hooks {
            after_copy: vec![hook_fn(|_| async { Err::<(), _>(anyhow::anyhow!("boom")) })],
            ..Default::default()
        };
        let options = ws.builder(Platform::Linux).hooks(hooks).build().unwrap();

        let err = Packager::new(options, ws.collaborators())
            .package()
            .await
            .unwrap_err();
        assert_eq!(err.category(), "hook");
        assert!(err.to_string().contains("boom"));
        assert!(!ws.path("out/Foo-linux-x64").exists());
    }

    #[tokio::test]
    async fn test_targets_package_concurrently_with_skips() {
        let ws = Workspace::new();
        let options = ws
            .builder(Platform::Linux)
            .platforms(vec![Platform::Linux, Platform::Win32])
            .arches(vec![Arch::X64, Arch::Mips64el])
            .build()
            .unwrap();

        let report = Packager::new(options, ws.collaborators())
            .package()
            .await
            .unwrap();

        assert_eq!(
            report.paths(),
            vec![ws.path("out/Foo-linux-x64"), ws.path("out/Foo-win32-x64")]
        );
        assert!(report.warnings.contains(&Warning::UnsupportedTarget {
            target: Target::new(Platform::Win32, Arch::Mips64el)
        }));
    }

    #[tokio::test]
    async fn test_missing_template_is_an_error() {
        let ws = Workspace::new();
        let options = ws
            .builder(Platform::Win32)
            .arches(vec![Arch::Arm64])
            .build()
            .unwrap();
        let err = Packager::new(options, ws.collaborators())
            .package()
            .await
            .unwrap_err();
        assert_eq!(err.category(), "staging");
        assert!(err.to_string().contains("win32-arm64"));
    }

    #[tokio::test]
    async fn test_root_is_never_a_kept_module() {
        let ws = Workspace::new();
        let app = ws.path("app");
        let resolver = NodeModulesResolver::new();
        let pruner = Pruner::new(&app, &resolver, &[]);
        let mut ctx = RunContext::new(Target::new(Platform::Linux, Arch::X64));

        assert!(!pruner.classify(&mut ctx, &app).await.unwrap());
        assert!(
            pruner
                .classify(&mut ctx, &app.join("node_modules/dep"))
                .await
                .unwrap()
        );
        assert!(
            !pruner
                .classify(&mut ctx, &app.join("node_modules/devdep"))
                .await
                .unwrap()
        );
    }
}
