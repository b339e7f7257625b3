use std::fs;
use std::path::Path;

use vsdelphi::{DescriptorReader, DprojReader, UnitMapping, discover_units, patch_map_file};

const DPROJ: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Project xmlns="http://schemas.microsoft.com/developer/msbuild/2003">
    <PropertyGroup>
        <ProjectGuid>{5A8B2C71-3C8B-4D2B-9E66-2B1A0E7C1F10}</ProjectGuid>
        <MainSource>App.dpr</MainSource>
        <Config Condition="'$(Config)'==''">Debug</Config>
        <Platform Condition="'$(Platform)'==''">Win32</Platform>
    </PropertyGroup>
    <PropertyGroup Condition="'$(Base)'!=''">
        <DCC_ExeOutput>bin\$(Config)</DCC_ExeOutput>
        <DCC_UnitSearchPath>lib;$(DCC_UnitSearchPath)</DCC_UnitSearchPath>
        <SanitizedProjectName>App</SanitizedProjectName>
    </PropertyGroup>
    <ItemGroup>
        <DelphiCompile Include="$(MainSource)">
            <MainSource>MainSource</MainSource>
        </DelphiCompile>
        <DCCReference Include="forms\MainForm.pas"/>
    </ItemGroup>
</Project>"#;

const DPR: &str = "program App;\r\n\r\nuses\r\n  Vcl.Forms,\r\n  \
MainForm in 'forms\\MainForm.pas',\r\n  Helpers in 'shared\\Helpers.pas';\r\n\r\n\
begin\r\nend.\r\n";

const MAP: &str = " Start         Length     Name                   Class\r\n\
 0001:00401000 000A2B4CH .text                   CODE\r\n\r\n\
Line numbers for System(System.pas) segment .text\r\n\r\n\
Line numbers for MainForm(C:\\Build\\forms\\MAINFORM.PAS) segment .text\r\n\r\n\
Line numbers for Helpers(shared\\Helpers.pas) segment .text\r\n\r\n\
Line numbers for Json(Json.pas) segment .text\r\n\r\n\
Line numbers for Config(Config.inc) segment .text\r\n";

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[tokio::test]
async fn project_units_end_up_in_the_map_file() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(&root.join("App.dproj"), DPROJ);
    write(&root.join("App.dpr"), DPR);
    write(&root.join("forms").join("MainForm.pas"), "unit MainForm;");
    write(&root.join("shared").join("Helpers.pas"), "unit Helpers;");
    write(&root.join("lib").join("json").join("Json.pas"), "unit Json;");
    write(&root.join("lib").join("Config.inc"), "{$DEFINE X}");
    let map = root.join("bin").join("Debug").join("App.map");
    write(&map, MAP);

    let descriptor = DprojReader::new().read(&root.join("App.dproj")).unwrap();
    assert_eq!(
        descriptor.executable,
        root.join("bin").join("Debug").join("App.exe")
    );
    assert_eq!(descriptor.map_file(), map);

    let units = discover_units(&descriptor, &[]).await;
    assert_eq!(units[0], root.join("App.dpr"));
    let mapping: UnitMapping = units.into_iter().collect();
    assert_eq!(
        mapping.resolve("mainform.pas"),
        Some(root.join("forms").join("MainForm.pas").as_path())
    );

    let report = patch_map_file(&map, &mapping).await.unwrap();
    assert_eq!(report.rewritten, 4);
    assert_eq!(report.unmapped, vec!["System.pas"]);
    assert_eq!(fs::read_to_string(&report.backup).unwrap(), MAP);

    let patched = fs::read_to_string(&map).unwrap();
    for (unit, path) in [
        ("MainForm", root.join("forms").join("MainForm.pas")),
        ("Helpers", root.join("shared").join("Helpers.pas")),
        ("Json", root.join("lib").join("json").join("Json.pas")),
        ("Config", root.join("lib").join("Config.inc")),
    ] {
        let expected = format!("Line numbers for {unit}({}) segment .text\r\n", path.display());
        assert!(patched.contains(&expected), "missing {expected:?} in {patched}");
    }
    assert!(patched.contains("Line numbers for System(System.pas) segment .text\r\n"));
}
