//! Build script for elveflow-sys FFI bindings.
//!
//! Two modes:
//!
//! 1. With the `elveflow-sdk` feature: bindgen runs over `Elveflow64.h` from
//!    `ELVEFLOW_SDK_DIR` and the crate links against the vendor library.
//! 2. Without it: link-only stubs are written so the workspace builds on
//!    machines without the SDK installed.

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=wrapper.h");
    println!("cargo:rerun-if-env-changed=ELVEFLOW_SDK_DIR");
    println!("cargo:rerun-if-env-changed=ELVEFLOW_LIB_DIR");

    #[cfg(feature = "elveflow-sdk")]
    generate_bindings();

    #[cfg(not(feature = "elveflow-sdk"))]
    generate_dummy_bindings();
}

#[cfg(feature = "elveflow-sdk")]
fn generate_bindings() {
    let sdk_dir = env::var("ELVEFLOW_SDK_DIR").expect(
        "ELVEFLOW_SDK_DIR environment variable must be set when `elveflow-sdk` feature is enabled.",
    );
    let sdk_dir = PathBuf::from(sdk_dir);

    let include_dir = sdk_dir.join("include");
    let include_dir = if include_dir.join("Elveflow64.h").exists() {
        include_dir
    } else {
        sdk_dir.clone()
    };
    if !include_dir.join("Elveflow64.h").exists() {
        panic!("Elveflow64.h not found under {:?}", sdk_dir);
    }
    println!(
        "cargo:rerun-if-changed={}",
        include_dir.join("Elveflow64.h").display()
    );

    let lib_dir = env::var("ELVEFLOW_LIB_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| sdk_dir.join("lib"));
    if !lib_dir.exists() {
        eprintln!("Warning: Elveflow SDK lib path does not exist: {:?}", lib_dir);
    }
    println!("cargo:rustc-link-search=native={}", lib_dir.display());
    println!("cargo:rustc-link-lib=dylib=Elveflow64");

    let bindings = bindgen::Builder::default()
        .header("wrapper.h")
        .clang_arg(format!("-I{}", include_dir.display()))
        .allowlist_function("OB1_.*")
        .allowlist_function("Elveflow_Calibration_.*")
        .allowlist_type("Z_.*")
        .allowlist_var("Z_.*")
        // Keep enum variants as flat constants so the names match the stub bindings
        .default_enum_style(bindgen::EnumVariation::Consts)
        .derive_debug(true)
        .derive_default(true)
        .generate_comments(true)
        .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()))
        .generate()
        .expect("Unable to generate Elveflow bindings");

    let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
    bindings
        .write_to_file(out_path.join("bindings.rs"))
        .expect("Couldn't write bindings!");
}

/// Write stub bindings when the SDK is not available.
#[cfg(not(feature = "elveflow-sdk"))]
fn generate_dummy_bindings() {
    let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
    let dummy = r#"
// Dummy bindings - elveflow-sdk feature not enabled
//
// Declarations mirror Elveflow64.h. The function bodies panic: they exist so
// the workspace links without the vendor library, and any accidental call
// without the real SDK is caught at runtime.

use std::os::raw::{c_char, c_uint};

pub type Z_regulator_type = c_uint;
pub const Z_regulator_type__none: Z_regulator_type = 0;
pub const Z_regulator_type__0_200_mbar: Z_regulator_type = 1;
pub const Z_regulator_type__0_2000_mbar: Z_regulator_type = 2;
pub const Z_regulator_type__0_8000_mbar: Z_regulator_type = 3;
pub const Z_regulator_type_m1000_1000_mbar: Z_regulator_type = 4;
pub const Z_regulator_type_m1000_6000_mbar: Z_regulator_type = 5;

pub type Z_Sensor_digit_analog = c_uint;
pub const Z_Sensor_digit_analog_Analog: Z_Sensor_digit_analog = 0;
pub const Z_Sensor_digit_analog_Digital: Z_Sensor_digit_analog = 1;

pub type Z_Sensor_FSD_Calib = c_uint;
pub const Z_Sensor_FSD_Calib_H2O: Z_Sensor_FSD_Calib = 0;
pub const Z_Sensor_FSD_Calib_IPA: Z_Sensor_FSD_Calib = 1;

pub type Z_D_F_S_Resolution = c_uint;
pub const Z_D_F_S_Resolution__9Bit: Z_D_F_S_Resolution = 0;
pub const Z_D_F_S_Resolution__10Bit: Z_D_F_S_Resolution = 1;
pub const Z_D_F_S_Resolution__11Bit: Z_D_F_S_Resolution = 2;
pub const Z_D_F_S_Resolution__12Bit: Z_D_F_S_Resolution = 3;
pub const Z_D_F_S_Resolution__13Bit: Z_D_F_S_Resolution = 4;
pub const Z_D_F_S_Resolution__14Bit: Z_D_F_S_Resolution = 5;
pub const Z_D_F_S_Resolution__15Bit: Z_D_F_S_Resolution = 6;
pub const Z_D_F_S_Resolution__16Bit: Z_D_F_S_Resolution = 7;

const ELVEFLOW_SDK_PANIC_MSG: &str = "Elveflow function called but elveflow-sdk feature is not enabled. \
    Enable the elveflow-sdk feature (or `hardware` in elveflow-ob1) to use the vendor library.";

#[no_mangle]
pub unsafe extern "C" fn OB1_Initialization(
    _device_name: *mut c_char,
    _reg_ch_1: u16,
    _reg_ch_2: u16,
    _reg_ch_3: u16,
    _reg_ch_4: u16,
    _ob1_id_out: *mut i32,
) -> i32 {
    panic!("{}", ELVEFLOW_SDK_PANIC_MSG);
}

#[no_mangle]
pub unsafe extern "C" fn OB1_Add_Sens(
    _ob1_id: i32,
    _channel_1_to_4: i32,
    _sensor_type: u16,
    _digital_analog: u16,
    _fsens_digit_calib: u16,
    _fsens_digit_resolution: u16,
) -> i32 {
    panic!("{}", ELVEFLOW_SDK_PANIC_MSG);
}

#[no_mangle]
pub unsafe extern "C" fn OB1_Set_Press(
    _ob1_id: i32,
    _channel_1_to_4: i32,
    _pressure: f64,
    _calib_array_in: *mut f64,
    _calib_array_len: i32,
) -> i32 {
    panic!("{}", ELVEFLOW_SDK_PANIC_MSG);
}

#[no_mangle]
pub unsafe extern "C" fn OB1_Get_Press(
    _ob1_id: i32,
    _channel_1_to_4: i32,
    _acquire_data1_true0_false: i32,
    _calib_array_in: *mut f64,
    _pressure: *mut f64,
    _calib_array_len: i32,
) -> i32 {
    panic!("{}", ELVEFLOW_SDK_PANIC_MSG);
}

#[no_mangle]
pub unsafe extern "C" fn OB1_Get_Sens_Data(
    _ob1_id: i32,
    _channel_1_to_4: i32,
    _acquire_data1_true0_false: i32,
    _sens_data: *mut f64,
) -> i32 {
    panic!("{}", ELVEFLOW_SDK_PANIC_MSG);
}

#[no_mangle]
pub unsafe extern "C" fn OB1_Set_All_Press(
    _ob1_id: i32,
    _pressure_array_in: *mut f64,
    _calib_array_in: *mut f64,
    _pressure_array_len: i32,
    _calib_array_len: i32,
) -> i32 {
    panic!("{}", ELVEFLOW_SDK_PANIC_MSG);
}

#[no_mangle]
pub unsafe extern "C" fn OB1_Destructor(_ob1_id: i32) -> i32 {
    panic!("{}", ELVEFLOW_SDK_PANIC_MSG);
}

#[no_mangle]
pub unsafe extern "C" fn Elveflow_Calibration_Default(
    _calib_array_out: *mut f64,
    _len: i32,
) -> i32 {
    panic!("{}", ELVEFLOW_SDK_PANIC_MSG);
}
"#;

    std::fs::write(out_path.join("bindings.rs"), dummy).expect("Couldn't write dummy bindings!");
}
