use std::net::UdpSocket;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::contact::Contact;
use crate::error::KademliaError;
use crate::id::NodeId;
use crate::MESSAGE_LENGTH;

/// An outbound RPC request, carrying the sender's own contact so the
/// receiver can update its routing table (§4.5).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Request {
    pub id: NodeId,
    pub sender: Contact,
    pub payload: RequestPayload,
}

/// The four RPC request bodies (§4.5).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum RequestPayload {
    Ping,
    Store(NodeId, Vec<u8>),
    FindNode(NodeId),
    FindValue(NodeId),
}

/// The response to an RPC request.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Response {
    pub request: Request,
    pub receiver: Contact,
    pub payload: ResponsePayload,
}

/// The four RPC response bodies (§4.5). `Pong` doubles as the STORE
/// acknowledgement, matching `{ok}` in the spec's RPC table.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ResponsePayload {
    Pong,
    Nodes(Vec<Contact>),
    Value(Vec<u8>),
}

/// A message on the wire: either half of an RPC, or a local shutdown
/// signal looped back through the same channel the listener uses.
#[derive(Serialize, Deserialize, Debug)]
pub enum Message {
    Request(Request),
    Response(Response),
    Kill,
}

/// UDP transport: serializes `Message`s with `bincode` and ships them as
/// single datagrams. Treated by the rest of the crate as an abstract
/// request/response channel (§1); this is simply the one concrete
/// implementation needed to make the crate runnable.
#[derive(Clone)]
pub struct Protocol {
    socket: Arc<UdpSocket>,
}

impl Protocol {
    /// Binds `socket` and spawns a listener thread that decodes inbound
    /// datagrams and forwards them on `tx`.
    pub fn new(socket: UdpSocket, tx: Sender<Message>) -> Protocol {
        let protocol = Protocol {
            socket: Arc::new(socket),
        };
        let listener = protocol.clone();
        thread::spawn(move || {
            let mut buffer = [0u8; MESSAGE_LENGTH];
            loop {
                let (len, _src_addr) = match listener.socket.recv_from(&mut buffer) {
                    Ok(result) => result,
                    Err(err) => {
                        warn!("Protocol: socket read error: {}", err);
                        break;
                    },
                };

                let message = match bincode::deserialize(&buffer[..len]) {
                    Ok(message) => message,
                    Err(err) => {
                        // A malformed datagram is a ProtocolError (§7); log and
                        // drop it rather than taking down the listener thread,
                        // unlike the teacher crate's `.unwrap()` here.
                        warn!("Protocol: could not decode datagram: {}", err);
                        continue;
                    },
                };

                if tx.send(message).is_err() {
                    warn!("Protocol: connection closed.");
                    break;
                }
            }
        });
        protocol
    }

    /// Serializes and sends `message` to `contact`.
    pub fn send_message(&self, message: &Message, contact: &Contact) -> Result<(), KademliaError> {
        let encoded = bincode::serialize(message)
            .map_err(|err| KademliaError::Protocol(err.to_string()))?;
        if encoded.len() > MESSAGE_LENGTH {
            return Err(KademliaError::Protocol(format!(
                "encoded message of {} bytes exceeds {} byte limit",
                encoded.len(),
                MESSAGE_LENGTH
            )));
        }
        self.socket
            .send_to(&encoded, contact.addr())
            .map_err(|err| KademliaError::transport(contact.addr(), err.to_string()))?;
        Ok(())
    }
}
