//! Response parser.
//!
//! Turns one framed response (a line plus any inline literals) into a
//! [`Response`]. Unknown untagged data is preserved as
//! [`UntaggedResponse::Other`] rather than rejected, because servers routinely
//! send extensions the client never asked for.

mod lexer;
mod types;

pub use lexer::{Lexer, Token};
pub use types::{Address, Envelope, FetchData, Response, UntaggedResponse};

use crate::types::{
    Capability, Flag, ListEntry, MailboxAttribute, MailboxStatusItems, ModSeq, ResponseCode,
    SeqNum, Status, Uid, UidSet, UidValidity, utf7,
};
use crate::Result;

/// Parses a single complete response.
///
/// # Errors
///
/// Returns [`crate::Error::Parse`] when the bytes are not a well-formed response.
pub fn parse_response(input: &[u8]) -> Result<Response> {
    let mut lx = Lexer::new(input);
    if lx.eat(b'+') {
        lx.eat(b' ');
        return Ok(Response::Continuation(lx.rest_of_line()));
    }
    match lx.next_token()? {
        Token::Star => {
            lx.expect_space()?;
            parse_untagged(&mut lx).map(Response::Untagged)
        }
        Token::Atom(tag) => {
            let tag = tag.to_string();
            lx.expect_space()?;
            let status = parse_status(lx.atom_str()?)
                .filter(|s| matches!(s, Status::Ok | Status::No | Status::Bad))
                .ok_or_else(|| lx.error("invalid tagged status"))?;
            let (code, text) = parse_resp_text(&mut lx)?;
            Ok(Response::Tagged {
                tag,
                status,
                code,
                text,
            })
        }
        other => Err(lx.error(format!("unexpected start of response: {other:?}"))),
    }
}

fn parse_status(s: &str) -> Option<Status> {
    match s.to_ascii_uppercase().as_str() {
        "OK" => Some(Status::Ok),
        "NO" => Some(Status::No),
        "BAD" => Some(Status::Bad),
        "PREAUTH" => Some(Status::PreAuth),
        "BYE" => Some(Status::Bye),
        _ => None,
    }
}

fn parse_untagged(lx: &mut Lexer<'_>) -> Result<UntaggedResponse> {
    match lx.next_token()? {
        Token::Number(n) => {
            let n = u32::try_from(n).map_err(|_| lx.error("message number exceeds 32 bits"))?;
            lx.expect_space()?;
            let kind = lx.atom_str()?.to_ascii_uppercase();
            match kind.as_str() {
                "EXISTS" => Ok(UntaggedResponse::Exists(n)),
                "RECENT" => Ok(UntaggedResponse::Recent(n)),
                "EXPUNGE" => SeqNum::new(n)
                    .map(UntaggedResponse::Expunge)
                    .ok_or_else(|| lx.error("EXPUNGE of sequence number 0")),
                "FETCH" => {
                    let seq = SeqNum::new(n).ok_or_else(|| lx.error("FETCH of sequence number 0"))?;
                    lx.expect_space()?;
                    let data = parse_fetch(lx)?;
                    Ok(UntaggedResponse::Fetch {
                        seq,
                        data: Box::new(data),
                    })
                }
                _ => Ok(UntaggedResponse::Other(format!("{n} {kind}{}", lx.rest_of_line()))),
            }
        }
        Token::Atom(name) => {
            if let Some(status) = parse_status(name) {
                let (code, text) = parse_resp_text(lx)?;
                return Ok(UntaggedResponse::Condition { status, code, text });
            }
            let upper = name.to_ascii_uppercase();
            match upper.as_str() {
                "CAPABILITY" => Ok(UntaggedResponse::Capability(parse_capabilities(lx)?)),
                "ENABLED" => {
                    let mut exts = Vec::new();
                    while lx.eat(b' ') {
                        exts.push(lx.atom_str()?.to_string());
                    }
                    Ok(UntaggedResponse::Enabled(exts))
                }
                "LIST" | "LSUB" => {
                    lx.expect_space()?;
                    parse_list(lx).map(UntaggedResponse::List)
                }
                "FLAGS" => {
                    lx.expect_space()?;
                    parse_flag_list(lx).map(UntaggedResponse::Flags)
                }
                "SEARCH" => parse_search(lx),
                "STATUS" => {
                    lx.expect_space()?;
                    parse_status_items(lx).map(UntaggedResponse::Status)
                }
                "VANISHED" => {
                    lx.expect_space()?;
                    parse_vanished(lx)
                }
                _ => Ok(UntaggedResponse::Other(format!(
                    "{name}{}",
                    lx.rest_of_line()
                ))),
            }
        }
        other => Err(lx.error(format!("unexpected untagged token: {other:?}"))),
    }
}

/// Parses `[code] text` following a status atom.
fn parse_resp_text(lx: &mut Lexer<'_>) -> Result<(Option<ResponseCode>, String)> {
    if !lx.eat(b' ') {
        return Ok((None, lx.rest_of_line()));
    }
    let code = if lx.eat(b'[') {
        let code = parse_response_code(lx)?;
        lx.eat(b' ');
        Some(code)
    } else {
        None
    };
    Ok((code, lx.rest_of_line()))
}

fn parse_response_code(lx: &mut Lexer<'_>) -> Result<ResponseCode> {
    let name = lx.atom_str()?.to_ascii_uppercase();
    let code = match name.as_str() {
        "ALERT" => ResponseCode::Alert,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "NOMODSEQ" => ResponseCode::NoModSeq,
        "CLOSED" => ResponseCode::Closed,
        "AUTHENTICATIONFAILED" => ResponseCode::AuthenticationFailed,
        "CAPABILITY" => ResponseCode::Capability(parse_capabilities(lx)?),
        "PERMANENTFLAGS" => {
            lx.expect_space()?;
            ResponseCode::PermanentFlags(parse_flag_list(lx)?)
        }
        "UIDNEXT" => {
            lx.expect_space()?;
            ResponseCode::UidNext(uid(lx)?)
        }
        "UIDVALIDITY" => {
            lx.expect_space()?;
            ResponseCode::UidValidity(uid_validity(lx)?)
        }
        "UNSEEN" => {
            lx.expect_space()?;
            ResponseCode::Unseen(lx.number32()?)
        }
        "HIGHESTMODSEQ" => {
            lx.expect_space()?;
            ResponseCode::HighestModSeq(ModSeq::new(lx.number()?))
        }
        "APPENDUID" => {
            lx.expect_space()?;
            let uid_validity = uid_validity(lx)?;
            lx.expect_space()?;
            ResponseCode::AppendUid {
                uid_validity,
                uids: uid_set(lx)?,
            }
        }
        "COPYUID" => {
            lx.expect_space()?;
            let uid_validity = uid_validity(lx)?;
            lx.expect_space()?;
            let source = uid_set(lx)?;
            lx.expect_space()?;
            ResponseCode::CopyUid {
                uid_validity,
                source,
                destination: uid_set(lx)?,
            }
        }
        _ => {
            let arg = if lx.eat(b' ') {
                Some(lx.until(b']')?.to_string())
            } else {
                None
            };
            ResponseCode::Other(name, arg)
        }
    };
    if !lx.eat(b']') {
        return Err(lx.error("unterminated response code"));
    }
    Ok(code)
}

fn uid(lx: &mut Lexer<'_>) -> Result<Uid> {
    let n = lx.number32()?;
    Uid::new(n).ok_or_else(|| lx.error("UID 0"))
}

fn uid_validity(lx: &mut Lexer<'_>) -> Result<UidValidity> {
    let n = lx.number32()?;
    UidValidity::new(n).ok_or_else(|| lx.error("UIDVALIDITY 0"))
}

fn uid_set(lx: &mut Lexer<'_>) -> Result<UidSet> {
    let text = match lx.next_token()? {
        Token::Number(n) => n.to_string(),
        Token::Atom(s) => s.to_string(),
        other => return Err(lx.error(format!("expected uid set, got {other:?}"))),
    };
    UidSet::parse(&text).ok_or_else(|| lx.error(format!("malformed uid set {text}")))
}

fn parse_capabilities(lx: &mut Lexer<'_>) -> Result<Vec<Capability>> {
    let mut caps = Vec::new();
    while lx.eat(b' ') {
        if lx.at_line_end() || lx.peek() == Some(b']') {
            break;
        }
        caps.push(Capability::parse(lx.atom_str()?));
    }
    if !lx.at_line_end() && lx.peek() != Some(b']') {
        lx.rest_of_line();
    }
    Ok(caps)
}

fn parse_flag_list(lx: &mut Lexer<'_>) -> Result<Vec<Flag>> {
    if lx.next_token()? != Token::LParen {
        return Err(lx.error("expected flag list"));
    }
    let mut flags = Vec::new();
    loop {
        match lx.next_token()? {
            Token::RParen => return Ok(flags),
            Token::Space => {}
            Token::Atom(a) => flags.push(Flag::parse(a)),
            other => return Err(lx.error(format!("unexpected token in flag list: {other:?}"))),
        }
    }
}

fn parse_list(lx: &mut Lexer<'_>) -> Result<ListEntry> {
    let attributes = parse_flag_list(lx)?
        .into_iter()
        .map(|f| MailboxAttribute::parse(&f.to_string()))
        .collect();
    lx.expect_space()?;
    let delimiter = lx.nstring()?.and_then(|d| d.chars().next());
    lx.expect_space()?;
    let raw = match lx.peek() {
        Some(b'"' | b'{') => lx.astring()?,
        // Some servers send bare names containing brackets, e.g. [Gmail]/Sent.
        _ => lx.until(b' ')?.to_string(),
    };
    lx.rest_of_line();
    Ok(ListEntry {
        attributes,
        delimiter,
        path: utf7::decode(&raw),
    })
}

fn parse_search(lx: &mut Lexer<'_>) -> Result<UntaggedResponse> {
    let mut ids = Vec::new();
    let mut mod_seq = None;
    while lx.eat(b' ') {
        match lx.next_token()? {
            Token::Number(n) => {
                ids.push(u32::try_from(n).map_err(|_| lx.error("id exceeds 32 bits"))?);
            }
            Token::LParen => {
                let name = lx.atom_str()?;
                if !name.eq_ignore_ascii_case("MODSEQ") {
                    return Err(lx.error("unexpected search modifier"));
                }
                lx.expect_space()?;
                mod_seq = Some(ModSeq::new(lx.number()?));
                if lx.next_token()? != Token::RParen {
                    return Err(lx.error("unterminated MODSEQ"));
                }
            }
            Token::Crlf | Token::Eof => break,
            other => return Err(lx.error(format!("unexpected search token: {other:?}"))),
        }
    }
    Ok(UntaggedResponse::Search { ids, mod_seq })
}

fn parse_status_items(lx: &mut Lexer<'_>) -> Result<MailboxStatusItems> {
    let mailbox = utf7::decode(&lx.astring()?);
    lx.expect_space()?;
    if lx.next_token()? != Token::LParen {
        return Err(lx.error("expected status list"));
    }
    let mut items = MailboxStatusItems {
        mailbox,
        ..MailboxStatusItems::default()
    };
    loop {
        match lx.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(name) => {
                lx.expect_space()?;
                let value = lx.number()?;
                let small = u32::try_from(value).ok();
                match name.to_ascii_uppercase().as_str() {
                    "MESSAGES" => items.messages = small,
                    "UNSEEN" => items.unseen = small,
                    "UIDNEXT" => items.uid_next = small.and_then(Uid::new),
                    "UIDVALIDITY" => items.uid_validity = small.and_then(UidValidity::new),
                    "HIGHESTMODSEQ" => items.highest_mod_seq = Some(ModSeq::new(value)),
                    _ => {}
                }
            }
            other => return Err(lx.error(format!("unexpected status token: {other:?}"))),
        }
    }
    lx.rest_of_line();
    Ok(items)
}

fn parse_vanished(lx: &mut Lexer<'_>) -> Result<UntaggedResponse> {
    let earlier = if lx.peek() == Some(b'(') {
        lx.next_token()?;
        let word = lx.atom_str()?;
        if !word.eq_ignore_ascii_case("EARLIER") || lx.next_token()? != Token::RParen {
            return Err(lx.error("malformed VANISHED modifier"));
        }
        lx.expect_space()?;
        true
    } else {
        false
    };
    let uids = uid_set(lx)?;
    lx.rest_of_line();
    Ok(UntaggedResponse::Vanished { earlier, uids })
}

fn parse_fetch(lx: &mut Lexer<'_>) -> Result<FetchData> {
    if lx.next_token()? != Token::LParen {
        return Err(lx.error("expected FETCH attribute list"));
    }
    let mut data = FetchData::default();
    loop {
        let name = match lx.next_token()? {
            Token::RParen => break,
            Token::Space => continue,
            Token::Atom(a) => a.to_ascii_uppercase(),
            other => return Err(lx.error(format!("unexpected FETCH token: {other:?}"))),
        };
        match name.as_str() {
            "UID" => {
                lx.expect_space()?;
                data.uid = Some(uid(lx)?);
            }
            "FLAGS" => {
                lx.expect_space()?;
                data.flags = Some(parse_flag_list(lx)?);
            }
            "MODSEQ" => {
                lx.expect_space()?;
                if lx.next_token()? != Token::LParen {
                    return Err(lx.error("expected ( after MODSEQ"));
                }
                data.mod_seq = Some(ModSeq::new(lx.number()?));
                if lx.next_token()? != Token::RParen {
                    return Err(lx.error("expected ) after MODSEQ value"));
                }
            }
            "RFC822.SIZE" => {
                lx.expect_space()?;
                data.size = Some(lx.number32()?);
            }
            "INTERNALDATE" => {
                lx.expect_space()?;
                data.internal_date = lx.nstring()?;
            }
            "ENVELOPE" => {
                lx.expect_space()?;
                data.envelope = Some(parse_envelope(lx)?);
            }
            "BODY" if lx.peek() == Some(b'[') => {
                lx.eat(b'[');
                let section = lx.until(b']')?.to_ascii_uppercase();
                lx.eat(b']');
                if lx.eat(b'<') {
                    lx.until(b'>')?;
                    lx.eat(b'>');
                }
                lx.expect_space()?;
                let payload = lx.nstring_bytes()?;
                if section.is_empty() {
                    data.body = payload;
                } else if section.starts_with("HEADER") {
                    data.header_fields = payload;
                }
            }
            _ => {
                lx.expect_space()?;
                lx.skip_value()?;
            }
        }
    }
    Ok(data)
}

fn parse_envelope(lx: &mut Lexer<'_>) -> Result<Envelope> {
    if lx.next_token()? != Token::LParen {
        return Err(lx.error("expected envelope"));
    }
    let date = lx.nstring()?;
    lx.expect_space()?;
    let subject = lx.nstring()?;
    let mut lists: [Vec<Address>; 6] = Default::default();
    for list in &mut lists {
        lx.expect_space()?;
        *list = parse_address_list(lx)?;
    }
    lx.expect_space()?;
    let in_reply_to = lx.nstring()?;
    lx.expect_space()?;
    let message_id = lx.nstring()?;
    if lx.next_token()? != Token::RParen {
        return Err(lx.error("unterminated envelope"));
    }
    let [from, sender, reply_to, to, cc, bcc] = lists;
    Ok(Envelope {
        date,
        subject,
        from,
        sender,
        reply_to,
        to,
        cc,
        bcc,
        in_reply_to,
        message_id,
    })
}

fn parse_address_list(lx: &mut Lexer<'_>) -> Result<Vec<Address>> {
    match lx.next_token()? {
        Token::Nil => Ok(Vec::new()),
        Token::LParen => {
            let mut out = Vec::new();
            loop {
                match lx.next_token()? {
                    Token::RParen => return Ok(out),
                    Token::Space => {}
                    Token::LParen => {
                        let name = lx.nstring()?;
                        lx.expect_space()?;
                        let _route = lx.nstring()?;
                        lx.expect_space()?;
                        let mailbox = lx.nstring()?;
                        lx.expect_space()?;
                        let host = lx.nstring()?;
                        if lx.next_token()? != Token::RParen {
                            return Err(lx.error("unterminated address"));
                        }
                        out.push(Address {
                            name,
                            mailbox,
                            host,
                        });
                    }
                    other => return Err(lx.error(format!("unexpected address token: {other:?}"))),
                }
            }
        }
        other => Err(lx.error(format!("expected address list, got {other:?}"))),
    }
}
