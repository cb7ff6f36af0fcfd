//! Server capabilities and tagged response status.

use std::fmt;

/// Completion status of a tagged or untagged condition response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Operational failure.
    No,
    /// Protocol or syntax failure.
    Bad,
    /// Greeting for a pre-authenticated session.
    PreAuth,
    /// Server is closing the connection.
    Bye,
}

/// A single advertised server capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1` (RFC 3501).
    Imap4Rev1,
    /// `IMAP4rev2` (RFC 9051).
    Imap4Rev2,
    /// IDLE (RFC 2177).
    Idle,
    /// UIDPLUS (RFC 4315).
    UidPlus,
    /// MOVE (RFC 6851).
    Move,
    /// STARTTLS.
    StartTls,
    /// LOGIN is refused on this connection.
    LoginDisabled,
    /// SASL initial response (RFC 4959).
    SaslIr,
    /// A SASL mechanism such as `PLAIN` or `XOAUTH2`.
    Auth(String),
    /// ENABLE (RFC 5161).
    Enable,
    /// CONDSTORE (RFC 7162).
    CondStore,
    /// QRESYNC (RFC 7162).
    QResync,
    /// SPECIAL-USE (RFC 6154).
    SpecialUse,
    /// LITERAL+ (RFC 7888).
    LiteralPlus,
    /// Anything else, kept verbatim.
    Other(String),
}

impl Capability {
    /// Parses one capability atom (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "IMAP4REV2" => Self::Imap4Rev2,
            "IDLE" => Self::Idle,
            "UIDPLUS" => Self::UidPlus,
            "MOVE" => Self::Move,
            "STARTTLS" => Self::StartTls,
            "LOGINDISABLED" => Self::LoginDisabled,
            "SASL-IR" => Self::SaslIr,
            "ENABLE" => Self::Enable,
            "CONDSTORE" => Self::CondStore,
            "QRESYNC" => Self::QResync,
            "SPECIAL-USE" => Self::SpecialUse,
            "LITERAL+" => Self::LiteralPlus,
            _ => upper
                .strip_prefix("AUTH=")
                .map_or_else(|| Self::Other(s.to_string()), |m| Self::Auth(m.to_string())),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Imap4Rev1 => "IMAP4rev1",
            Self::Imap4Rev2 => "IMAP4rev2",
            Self::Idle => "IDLE",
            Self::UidPlus => "UIDPLUS",
            Self::Move => "MOVE",
            Self::StartTls => "STARTTLS",
            Self::LoginDisabled => "LOGINDISABLED",
            Self::SaslIr => "SASL-IR",
            Self::Enable => "ENABLE",
            Self::CondStore => "CONDSTORE",
            Self::QResync => "QRESYNC",
            Self::SpecialUse => "SPECIAL-USE",
            Self::LiteralPlus => "LITERAL+",
            Self::Auth(mech) => return write!(f, "AUTH={mech}"),
            Self::Other(s) => s,
        };
        f.write_str(s)
    }
}

/// The capability set of one connection.
///
/// Refreshed after the greeting, after STARTTLS and after authentication,
/// since servers advertise different sets in each phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(Vec<Capability>);

impl Capabilities {
    /// Wraps a parsed capability list.
    #[must_use]
    pub const fn new(caps: Vec<Capability>) -> Self {
        Self(caps)
    }

    /// Returns true if nothing has been learned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if `cap` is advertised.
    #[must_use]
    pub fn has(&self, cap: &Capability) -> bool {
        // CONDSTORE is implied by QRESYNC (RFC 7162 section 3.2.3).
        self.0.contains(cap)
            || (*cap == Capability::CondStore && self.0.contains(&Capability::QResync))
    }

    /// Returns true if the SASL mechanism is advertised.
    #[must_use]
    pub fn has_auth(&self, mechanism: &str) -> bool {
        self.0
            .iter()
            .any(|c| matches!(c, Capability::Auth(m) if m.eq_ignore_ascii_case(mechanism)))
    }

    /// Iterates over the advertised capabilities.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_auth_mechanisms() {
        assert_eq!(
            Capability::parse("AUTH=XOAUTH2"),
            Capability::Auth("XOAUTH2".into())
        );
        assert_eq!(
            Capability::parse("auth=plain"),
            Capability::Auth("PLAIN".into())
        );
    }

    #[test]
    fn unknown_capabilities_round_trip_verbatim() {
        let cap = Capability::parse("X-GM-EXT-1");
        assert_eq!(cap.to_string(), "X-GM-EXT-1");
    }

    #[test]
    fn qresync_implies_condstore() {
        let caps = Capabilities::new(vec![Capability::Imap4Rev1, Capability::QResync]);
        assert!(caps.has(&Capability::CondStore));
        assert!(!caps.has(&Capability::Idle));
    }

    #[test]
    fn has_auth_is_case_insensitive() {
        let caps = Capabilities::new(vec![Capability::parse("AUTH=PLAIN")]);
        assert!(caps.has_auth("plain"));
        assert!(!caps.has_auth("XOAUTH2"));
    }
}
