use super::keyspace::{KeyGenerator, ValueGenerator};
use loadgen_core::{Command, OpKind};
use rand::Rng;
use std::sync::Arc;

const HASH_FIELDS: u32 = 10;
const SET_MEMBERS: u32 = 100;
const EXPIRE_SECS: i64 = 60;

/// Turns a selected operation into a concrete command with generated
/// arguments.
#[derive(Debug, Clone)]
pub struct CommandFactory {
    keys: KeyGenerator,
    values: ValueGenerator,
    channels: Arc<[String]>,
}

impl CommandFactory {
    pub fn new(keys: KeyGenerator, values: ValueGenerator, channels: Arc<[String]>) -> Self {
        Self {
            keys,
            values,
            channels,
        }
    }

    /// `None` for operations that are not a single request (SUBSCRIBE), and
    /// for PUBLISH without channels.
    pub fn build<R: Rng>(&self, op: OpKind, rng: &mut R) -> Option<Command> {
        let name = op.name();
        let command = match op {
            OpKind::Subscribe => return None,
            OpKind::Publish => {
                if self.channels.is_empty() {
                    return None;
                }
                let channel = &self.channels[rng.random_range(0..self.channels.len())];
                Command::new(name)
                    .arg(channel)
                    .arg(self.values.next_value(rng))
            }
            OpKind::Set | OpKind::Append | OpKind::LPush | OpKind::RPush => Command::new(name)
                .arg(self.keys.next_key(rng))
                .arg(self.values.next_value(rng)),
            OpKind::Get
            | OpKind::Del
            | OpKind::Incr
            | OpKind::Decr
            | OpKind::Strlen
            | OpKind::Exists
            | OpKind::Ttl
            | OpKind::Type
            | OpKind::LPop
            | OpKind::RPop
            | OpKind::LLen
            | OpKind::SMembers
            | OpKind::SCard
            | OpKind::HGetAll
            | OpKind::HLen
            | OpKind::ZCard => Command::new(name).arg(self.keys.next_key(rng)),
            OpKind::IncrBy | OpKind::DecrBy => Command::new(name)
                .arg(self.keys.next_key(rng))
                .arg_int(rng.random_range(1..100)),
            OpKind::Expire => Command::new(name)
                .arg(self.keys.next_key(rng))
                .arg_int(EXPIRE_SECS),
            OpKind::LRange | OpKind::ZRange => {
                let start = rng.random_range(0..=10i64);
                let end = start + rng.random_range(1..=20i64);
                Command::new(name)
                    .arg(self.keys.next_key(rng))
                    .arg_int(start)
                    .arg_int(end)
            }
            OpKind::LTrim => Command::new(name)
                .arg(self.keys.next_key(rng))
                .arg_int(0)
                .arg_int(rng.random_range(10..=100i64)),
            OpKind::SAdd | OpKind::SRem | OpKind::ZRem | OpKind::ZScore => Command::new(name)
                .arg(self.keys.next_key(rng))
                .arg(member(rng)),
            OpKind::HSet => Command::new(name)
                .arg(self.keys.next_key(rng))
                .arg(field(rng))
                .arg(self.values.next_value(rng)),
            OpKind::HGet | OpKind::HDel => Command::new(name)
                .arg(self.keys.next_key(rng))
                .arg(field(rng)),
            OpKind::ZAdd => Command::new(name)
                .arg(self.keys.next_key(rng))
                .arg_int(rng.random_range(0..1000i64))
                .arg(member(rng)),
        };
        Some(command)
    }
}

fn field<R: Rng>(rng: &mut R) -> String {
    format!("field:{}", rng.random_range(0..HASH_FIELDS))
}

fn member<R: Rng>(rng: &mut R) -> String {
    format!("member:{}", rng.random_range(0..SET_MEMBERS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadgen_core::ValueSize;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::AtomicU64;

    fn factory(channels: &[&str]) -> CommandFactory {
        CommandFactory::new(
            KeyGenerator::new("t", 100, Arc::new(AtomicU64::new(0))),
            ValueGenerator::new(ValueSize::Fixed(8)),
            channels.iter().map(|c| c.to_string()).collect(),
        )
    }

    fn text(command: &Command) -> Vec<String> {
        command
            .args()
            .iter()
            .map(|a| String::from_utf8(a.clone()).unwrap())
            .collect()
    }

    #[test]
    fn test_every_request_operation_builds() {
        let factory = factory(&["news"]);
        let mut rng = StdRng::seed_from_u64(9);
        for op in OpKind::ALL {
            let built = factory.build(op, &mut rng);
            if op == OpKind::Subscribe {
                assert!(built.is_none());
            } else {
                let command = built.unwrap();
                assert_eq!(command.name(), op.name());
            }
        }
    }

    #[test]
    fn test_argument_shapes() {
        let factory = factory(&["news"]);
        let mut rng = StdRng::seed_from_u64(11);

        let set = text(&factory.build(OpKind::Set, &mut rng).unwrap());
        assert_eq!(set.len(), 3);
        assert!(set[1].starts_with("t:"));
        assert_eq!(set[2].len(), 8);

        let lrange = text(&factory.build(OpKind::LRange, &mut rng).unwrap());
        let start: i64 = lrange[2].parse().unwrap();
        let end: i64 = lrange[3].parse().unwrap();
        assert!((0..=10).contains(&start));
        assert!(end > start && end <= start + 20);

        let hset = text(&factory.build(OpKind::HSet, &mut rng).unwrap());
        assert!(hset[2].starts_with("field:"));

        let expire = text(&factory.build(OpKind::Expire, &mut rng).unwrap());
        assert_eq!(expire[2], "60");

        let publish = text(&factory.build(OpKind::Publish, &mut rng).unwrap());
        assert_eq!(publish[1], "news");
    }

    #[test]
    fn test_publish_without_channels() {
        let factory = factory(&[]);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(factory.build(OpKind::Publish, &mut rng).is_none());
    }
}
