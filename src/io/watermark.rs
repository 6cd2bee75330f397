/*
    Nyx, blazing fast astrodynamics
    Copyright (C) 2018-onwards Christopher Rabotin <christopher.rabotin@gmail.com>

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use crate::time::{Epoch, TimeScale};

/// Name and version of this crate
pub(crate) fn prj_name_ver() -> String {
    format!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// Key/value pairs stamped at the top of the generated reports
pub(crate) fn watermark() -> Vec<(String, String)> {
    let created = match Epoch::now() {
        Ok(now) => format!("{}", now.to_time_scale(TimeScale::UTC)),
        Err(e) => {
            warn!("could not read the system time: {e}");
            "unknown".to_string()
        }
    };
    let host = whoami::fallible::hostname().unwrap_or_else(|_| "unknown".to_string());
    vec![
        ("Generated by".to_string(), prj_name_ver()),
        ("Created".to_string(), created),
        ("User".to_string(), whoami::username()),
        ("Host".to_string(), host),
    ]
}
