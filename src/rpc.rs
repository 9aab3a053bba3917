use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::key::Key;
use crate::protocol::{Client, KeyValue, Request, RequestPayload, ResponsePayload};
use crate::SUCCESSOR_LIST_SIZE;

/// The operations a ring member exposes to its peers.
pub trait ChordService {
    /// Returns the address of the node owning `id`.
    fn find_successor(&self, id: &Key) -> Result<String>;

    fn get_predecessor(&self) -> String;

    fn get_successor_list(&self) -> [String; SUCCESSOR_LIST_SIZE];

    /// Hands the pairs now owned by `joiner` over to it and adopts it as predecessor.
    fn transfer_data(&self, joiner: &str) -> Result<HashMap<String, String>>;

    /// Removes the given keys from the backup set.
    fn sub_backup(&self, data: &HashMap<String, String>);

    /// Merges the given pairs into the backup set.
    fn add_backup(&self, data: HashMap<String, String>);

    /// Returns a snapshot of the primary set, for a successor to install as its backup.
    fn set_backup(&self) -> HashMap<String, String>;

    /// Runs predecessor-failure recovery.
    fn change_predecessor(&self) -> Result<()>;

    fn notify(&self, candidate: &str) -> Result<()>;

    fn stabilize(&self) -> Result<()>;

    fn insert_pair_in_data(&self, pair: KeyValue) -> Result<()>;

    fn insert_pair_in_backup(&self, pair: KeyValue);

    fn get_value(&self, key: &str) -> Result<String>;

    fn erase_pair_in_data(&self, key: &str) -> Result<()>;

    fn erase_pair_in_backup(&self, key: &str) -> Result<()>;
}

/// Invokes the method named by `request` on `service`.
pub fn dispatch<S: ChordService>(service: &S, request: Request) -> ResponsePayload {
    let result = match request.payload {
        RequestPayload::FindSuccessor(id) => {
            service.find_successor(&id).map(ResponsePayload::Address)
        },
        RequestPayload::GetPredecessor => Ok(ResponsePayload::Address(service.get_predecessor())),
        RequestPayload::GetSuccessorList => {
            Ok(ResponsePayload::SuccessorList(service.get_successor_list()))
        },
        RequestPayload::TransferData(joiner) => {
            service.transfer_data(&joiner).map(ResponsePayload::Data)
        },
        RequestPayload::SubBackup(data) => {
            service.sub_backup(&data);
            Ok(ResponsePayload::Done)
        },
        RequestPayload::AddBackup(data) => {
            service.add_backup(data);
            Ok(ResponsePayload::Done)
        },
        RequestPayload::SetBackup => Ok(ResponsePayload::Data(service.set_backup())),
        RequestPayload::ChangePredecessor => {
            service.change_predecessor().map(|_| ResponsePayload::Done)
        },
        RequestPayload::Notify(candidate) => {
            service.notify(&candidate).map(|_| ResponsePayload::Done)
        },
        RequestPayload::Stabilize => service.stabilize().map(|_| ResponsePayload::Done),
        RequestPayload::InsertPairInData(pair) => {
            service.insert_pair_in_data(pair).map(|_| ResponsePayload::Done)
        },
        RequestPayload::InsertPairInBackup(pair) => {
            service.insert_pair_in_backup(pair);
            Ok(ResponsePayload::Done)
        },
        RequestPayload::GetValue(key) => service.get_value(&key).map(ResponsePayload::Value),
        RequestPayload::ErasePairInData(key) => {
            service.erase_pair_in_data(&key).map(|_| ResponsePayload::Done)
        },
        RequestPayload::ErasePairInBackup(key) => {
            service.erase_pair_in_backup(&key).map(|_| ResponsePayload::Done)
        },
    };
    result.unwrap_or_else(|err| ResponsePayload::Error(err.to_string()))
}

/// Typed stubs for calling a `ChordService` on a peer.
pub struct RemoteNode<'a> {
    client: &'a Client,
    addr: &'a str,
}

impl<'a> RemoteNode<'a> {
    pub fn new(client: &'a Client, addr: &'a str) -> Self {
        RemoteNode { client, addr }
    }

    fn call_done(&self, payload: RequestPayload) -> Result<()> {
        let method = payload.method_name();
        match self.client.call(self.addr, payload)? {
            ResponsePayload::Done => Ok(()),
            _ => Err(Error::UnexpectedResponse(method)),
        }
    }

    fn call_data(&self, payload: RequestPayload) -> Result<HashMap<String, String>> {
        let method = payload.method_name();
        match self.client.call(self.addr, payload)? {
            ResponsePayload::Data(data) => Ok(data),
            _ => Err(Error::UnexpectedResponse(method)),
        }
    }

    pub fn find_successor(&self, id: &Key) -> Result<String> {
        match self.client.call(self.addr, RequestPayload::FindSuccessor(*id))? {
            ResponsePayload::Address(addr) => Ok(addr),
            _ => Err(Error::UnexpectedResponse("FindSuccessor")),
        }
    }

    pub fn get_predecessor(&self) -> Result<String> {
        match self.client.call(self.addr, RequestPayload::GetPredecessor)? {
            ResponsePayload::Address(addr) => Ok(addr),
            _ => Err(Error::UnexpectedResponse("GetPredecessor")),
        }
    }

    pub fn get_successor_list(&self) -> Result<[String; SUCCESSOR_LIST_SIZE]> {
        match self.client.call(self.addr, RequestPayload::GetSuccessorList)? {
            ResponsePayload::SuccessorList(list) => Ok(list),
            _ => Err(Error::UnexpectedResponse("GetSuccessorList")),
        }
    }

    pub fn transfer_data(&self, joiner: &str) -> Result<HashMap<String, String>> {
        self.call_data(RequestPayload::TransferData(joiner.to_string()))
    }

    pub fn sub_backup(&self, data: &HashMap<String, String>) -> Result<()> {
        self.call_done(RequestPayload::SubBackup(data.clone()))
    }

    pub fn add_backup(&self, data: HashMap<String, String>) -> Result<()> {
        self.call_done(RequestPayload::AddBackup(data))
    }

    pub fn set_backup(&self) -> Result<HashMap<String, String>> {
        self.call_data(RequestPayload::SetBackup)
    }

    pub fn change_predecessor(&self) -> Result<()> {
        self.call_done(RequestPayload::ChangePredecessor)
    }

    pub fn notify(&self, candidate: &str) -> Result<()> {
        self.call_done(RequestPayload::Notify(candidate.to_string()))
    }

    pub fn stabilize(&self) -> Result<()> {
        self.call_done(RequestPayload::Stabilize)
    }

    pub fn insert_pair_in_data(&self, pair: KeyValue) -> Result<()> {
        self.call_done(RequestPayload::InsertPairInData(pair))
    }

    pub fn insert_pair_in_backup(&self, pair: KeyValue) -> Result<()> {
        self.call_done(RequestPayload::InsertPairInBackup(pair))
    }

    pub fn get_value(&self, key: &str) -> Result<String> {
        match self.client.call(self.addr, RequestPayload::GetValue(key.to_string()))? {
            ResponsePayload::Value(value) => Ok(value),
            _ => Err(Error::UnexpectedResponse("GetValue")),
        }
    }

    pub fn erase_pair_in_data(&self, key: &str) -> Result<()> {
        self.call_done(RequestPayload::ErasePairInData(key.to_string()))
    }

    pub fn erase_pair_in_backup(&self, key: &str) -> Result<()> {
        self.call_done(RequestPayload::ErasePairInBackup(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{dispatch, ChordService};
    use crate::error::{Error, Result};
    use crate::key::Key;
    use crate::protocol::{KeyValue, Request, RequestPayload, ResponsePayload};
    use crate::SUCCESSOR_LIST_SIZE;
    use std::collections::HashMap;

    /// A lone node holding a single pair.
    struct Single;

    impl ChordService for Single {
        fn find_successor(&self, _id: &Key) -> Result<String> {
            Ok("self".to_string())
        }
        fn get_predecessor(&self) -> String {
            String::new()
        }
        fn get_successor_list(&self) -> [String; SUCCESSOR_LIST_SIZE] {
            Default::default()
        }
        fn transfer_data(&self, _joiner: &str) -> Result<HashMap<String, String>> {
            Ok(HashMap::new())
        }
        fn sub_backup(&self, _data: &HashMap<String, String>) {}
        fn add_backup(&self, _data: HashMap<String, String>) {}
        fn set_backup(&self) -> HashMap<String, String> {
            HashMap::new()
        }
        fn change_predecessor(&self) -> Result<()> {
            Ok(())
        }
        fn notify(&self, _candidate: &str) -> Result<()> {
            Ok(())
        }
        fn stabilize(&self) -> Result<()> {
            Err(Error::NoLiveSuccessor)
        }
        fn insert_pair_in_data(&self, _pair: KeyValue) -> Result<()> {
            Ok(())
        }
        fn insert_pair_in_backup(&self, _pair: KeyValue) {}
        fn get_value(&self, key: &str) -> Result<String> {
            if key == "k" {
                Ok("v".to_string())
            } else {
                Err(Error::KeyNotFound(key.to_string()))
            }
        }
        fn erase_pair_in_data(&self, key: &str) -> Result<()> {
            Err(Error::KeyNotFound(key.to_string()))
        }
        fn erase_pair_in_backup(&self, _key: &str) -> Result<()> {
            Ok(())
        }
    }

    fn request(payload: RequestPayload) -> Request {
        Request {
            sender: "test".to_string(),
            payload,
        }
    }

    #[test]
    fn test_dispatch() {
        assert_eq!(
            dispatch(&Single, request(RequestPayload::FindSuccessor(Key::hash("x")))),
            ResponsePayload::Address("self".to_string())
        );
        assert_eq!(
            dispatch(&Single, request(RequestPayload::GetValue("k".to_string()))),
            ResponsePayload::Value("v".to_string())
        );
        assert_eq!(
            dispatch(&Single, request(RequestPayload::SetBackup)),
            ResponsePayload::Data(HashMap::new())
        );
        assert_eq!(
            dispatch(&Single, request(RequestPayload::ChangePredecessor)),
            ResponsePayload::Done
        );
    }

    #[test]
    fn test_dispatch_reports_handler_errors() {
        match dispatch(&Single, request(RequestPayload::GetValue("missing".to_string()))) {
            ResponsePayload::Error(message) => assert!(message.contains("missing")),
            other => panic!("unexpected response {:?}", other),
        }
        match dispatch(&Single, request(RequestPayload::Stabilize)) {
            ResponsePayload::Error(_) => {},
            other => panic!("unexpected response {:?}", other),
        }
    }
}
