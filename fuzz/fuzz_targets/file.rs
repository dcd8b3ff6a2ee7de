#![no_main]

use libfuzzer_sys::fuzz_target;
use dotnet_deob::File;

fuzz_target!(|data: &[u8]| {
    if let Ok(file) = File::from_mem(data.to_vec()) {
        let _ = file.is_dotnet();
    }
});
