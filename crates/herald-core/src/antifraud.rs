//! Country calling code extraction and the anti-fraud policy.
//!
//! E.164 country calling codes are prefix-free: at most one of the 1, 2 and 3
//! digit prefixes of a number is an assigned code.

use crate::jid::Jid;

/// Assigned country calling codes (ITU-T E.164), sorted.
const CALLING_CODES: &[u16] = &[
    1, 7, 20, 27, 30, 31, 32, 33, 34, 36, 39, 40, 41, 43, 44, 45, 46, 47, 48, 49, 51, 52, 53, 54,
    55, 56, 57, 58, 60, 61, 62, 63, 64, 65, 66, 81, 82, 84, 86, 90, 91, 92, 93, 94, 95, 98, 211,
    212, 213, 216, 218, 220, 221, 222, 223, 224, 225, 226, 227, 228, 229, 230, 231, 232, 233, 234,
    235, 236, 237, 238, 239, 240, 241, 242, 243, 244, 245, 246, 247, 248, 249, 250, 251, 252, 253,
    254, 255, 256, 257, 258, 260, 261, 262, 263, 264, 265, 266, 267, 268, 269, 290, 291, 297, 298,
    299, 350, 351, 352, 353, 354, 355, 356, 357, 358, 359, 370, 371, 372, 373, 374, 375, 376, 377,
    378, 380, 381, 382, 383, 385, 386, 387, 389, 420, 421, 423, 500, 501, 502, 503, 504, 505, 506,
    507, 508, 509, 590, 591, 592, 593, 594, 595, 596, 597, 598, 599, 670, 672, 673, 674, 675, 676,
    677, 678, 679, 680, 681, 682, 683, 685, 686, 687, 688, 689, 690, 691, 692, 800, 808, 850, 852,
    853, 855, 856, 870, 878, 880, 881, 882, 883, 886, 888, 960, 961, 962, 963, 964, 965, 966, 967,
    968, 970, 971, 972, 973, 974, 975, 976, 977, 979, 992, 993, 994, 995, 996, 998,
];

/// Country calling code of a phone number given as digits.
///
/// Returns `None` if the number does not start with an assigned code.
pub fn calling_code(number: &str) -> Option<u16> {
    let digits = number.strip_prefix('+').unwrap_or(number);

    (1..=3).filter_map(|len| digits.get(..len)).find_map(|prefix| {
        let code: u16 = prefix.parse().ok()?;
        CALLING_CODES.binary_search(&code).ok().map(|_| code)
    })
}

/// Decision for one member joining a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Member may stay
    Allow,
    /// Member's calling code is denied
    Reject {
        /// Denied calling code
        code: u16,
    },
}

/// Denylist of country calling codes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AntiFraudPolicy {
    denied: Vec<u16>,
}

impl AntiFraudPolicy {
    /// Policy denying the given calling codes.
    pub fn new(denied: impl IntoIterator<Item = u16>) -> Self {
        let mut denied: Vec<u16> = denied.into_iter().collect();
        denied.sort_unstable();
        denied.dedup();
        Self { denied }
    }

    /// Whether the policy denies anything.
    pub fn is_empty(&self) -> bool {
        self.denied.is_empty()
    }

    /// Denied calling codes, sorted.
    pub fn denied(&self) -> &[u16] {
        &self.denied
    }

    /// Check a member identifier.
    pub fn check(&self, member: &Jid) -> Verdict {
        match calling_code(member.user_part()) {
            Some(code) if self.denied.binary_search(&code).is_ok() => Verdict::Reject { code },
            _ => Verdict::Allow,
        }
    }
}

/// Parse a comma separated list of calling codes (`"212, +92"`).
///
/// Entries that are not numbers are skipped.
pub fn parse_codes(list: &str) -> Vec<u16> {
    list.split(',')
        .map(|c| c.trim().trim_start_matches('+'))
        .filter_map(|c| c.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_table_is_sorted() {
        assert!(CALLING_CODES.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn extracts_codes_of_each_length() {
        assert_eq!(calling_code("14155550100"), Some(1));
        assert_eq!(calling_code("447700900000"), Some(44));
        assert_eq!(calling_code("212600000000"), Some(212));
        assert_eq!(calling_code("+923001234567"), Some(92));
        assert_eq!(calling_code("0000"), None);
        assert_eq!(calling_code(""), None);
    }

    #[test]
    fn policy_rejects_denied_codes() {
        let policy = AntiFraudPolicy::new(parse_codes("212, +92"));

        assert_eq!(
            policy.check(&Jid::new("212600000000@s.whatsapp.net")),
            Verdict::Reject { code: 212 }
        );
        assert_eq!(policy.check(&Jid::new("447700900000@s.whatsapp.net")), Verdict::Allow);
    }

    #[test]
    fn empty_policy_allows_everyone() {
        let policy = AntiFraudPolicy::default();
        assert!(policy.is_empty());
        assert_eq!(policy.check(&Jid::new("212600000000@s.whatsapp.net")), Verdict::Allow);
    }
}
