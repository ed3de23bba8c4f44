#![no_main]

use libfuzzer_sys::fuzz_target;
use latscope::control::parse_directive;
use latscope::{Sli, SliConfig};

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Must never panic, whatever the input
        let _ = parse_directive(input, 250);

        // A rejected write must leave the monitor untouched
        if let Ok(sli) = Sli::new(SliConfig::default()) {
            let group = sli.create_group(sli.root(), "fuzz");
            let before = sli.control_show(&group);
            if sli.control_write(&group, input).is_err() {
                assert_eq!(before, sli.control_show(&group));
            }
        }
    }

    let _ = latscope::Sli::new(SliConfig::default()).map(|sli| sli.enabled_write(data));
});
