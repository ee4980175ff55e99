//! Human-readable, colon-delimited flat-group control messages — kept
//! distinct from the pipe-framed [`crate::wire::Frame`] protocol since the
//! group's gossip/consensus chatter never touches file content.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    VoteRequest { from: String, req: String },
    Vote { voter: String, req: String, vote: String },
    Join { id: String, port: u16 },
    Leave { id: String },
    ForwardRequest { req: String },
}

impl Message {
    pub fn parse(line: &str) -> Option<Self> {
        let (tag, rest) = line.split_once(':')?;
        match tag {
            "VOTE_REQUEST" => {
                let (from, req) = rest.split_once(':')?;
                Some(Self::VoteRequest { from: from.to_string(), req: req.to_string() })
            }
            "VOTE" => {
                let (voter, rest) = rest.split_once(':')?;
                let (req, vote) = rest.split_once('|')?;
                Some(Self::Vote { voter: voter.to_string(), req: req.to_string(), vote: vote.to_string() })
            }
            "JOIN" => {
                let (id, port) = rest.split_once(':')?;
                Some(Self::Join { id: id.to_string(), port: port.parse().ok()? })
            }
            "LEAVE" => Some(Self::Leave { id: rest.to_string() }),
            "FORWARD_REQUEST" => Some(Self::ForwardRequest { req: rest.to_string() }),
            _ => None,
        }
    }

    pub fn serialize(&self) -> String {
        match self {
            Self::VoteRequest { from, req } => format!("VOTE_REQUEST:{from}:{req}"),
            Self::Vote { voter, req, vote } => format!("VOTE:{voter}:{req}|{vote}"),
            Self::Join { id, port } => format!("JOIN:{id}:{port}"),
            Self::Leave { id } => format!("LEAVE:{id}"),
            Self::ForwardRequest { req } => format!("FORWARD_REQUEST:{req}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_round_trips() {
        let msg = Message::Vote {
            voter: "p2".to_string(),
            req: "REQ_1".to_string(),
            vote: "ACK_P2_REQ_1".to_string(),
        };
        let line = msg.serialize();
        assert_eq!(line, "VOTE:p2:REQ_1|ACK_P2_REQ_1");
        assert_eq!(Message::parse(&line), Some(msg));
    }

    #[test]
    fn join_round_trips() {
        let msg = Message::Join { id: "p1".to_string(), port: 9001 };
        assert_eq!(Message::parse(&msg.serialize()), Some(msg));
    }

    #[test]
    fn unknown_tag_is_none() {
        assert_eq!(Message::parse("BOGUS:x"), None);
    }
}
