#![cfg(all(feature = "master", feature = "slave"))]

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use uartreg::{
    Config,
    codec::{Frame, Rtu},
    master::{Error, Master},
    registers::ExceptionCode,
    slave::{Outcome, Slave},
    };


/// silence after which the fake slave considers a request complete
const GAP: Duration = Duration::from_millis(5);

/// answer requests arriving on a stream, cutting frames on silences
async fn serve(slave: &Slave<Rtu, 16>, mut port: DuplexStream) {
    let mut request = Vec::new();
    let mut reply = Frame::new();
    let mut buffer = [0; 64];
    loop {
        match tokio::time::timeout(GAP, port.read(&mut buffer)).await {
            Ok(Ok(0)) | Ok(Err(_)) => return,
            Ok(Ok(size)) => request.extend_from_slice(&buffer[.. size]),
            Err(_) => {
                if request.is_empty()
                    {continue}
                if slave.process(&request, &mut reply).await == Ok(Outcome::Reply) {
                    port.write_all(&reply).await.unwrap();
                }
                request.clear();
            },
        }
    }
}

async fn test<F>(slave: &Slave<Rtu, 16>, test: F)
where F: AsyncFnOnce(&mut Master<DuplexStream>)
{
    let _ = env_logger::builder().is_test(true).try_init();
    let (near, far) = tokio::io::duplex(256);
    let mut master = Master::new(near).with_timeout(Duration::from_millis(50));
    tokio::select! {
        _ = serve(slave, far) => panic!("fake slave stopped"),
        _ = test(&mut master) => {},
    }
}


#[tokio::test(start_paused = true)]
async fn write_and_read() {
    let slave = Slave::new(Rtu, Config::new(9600, 1));
    test(&slave, async |master| {
        master.write_single(1, 3, 0xbeef).await.unwrap();
        master.write_multiple(1, 4, &[1, 2, 3]).await.unwrap();
        assert_eq!(master.read_holding(1, 2, 5).await.unwrap(), [0, 0xbeef, 1, 2, 3]);
    }).await;
    assert_eq!(slave.lock().await[3 .. 7], [0xbeef, 1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn refused_requests() {
    let slave = Slave::new(Rtu, Config::new(9600, 1));
    test(&slave, async |master| {
        assert!(matches!(
            master.read_holding(1, 15, 2).await,
            Err(Error::Exception(ExceptionCode::IllegalAddress)),
            ));
        assert!(matches!(
            master.write_single(1, 16, 1).await,
            Err(Error::Exception(ExceptionCode::IllegalAddress)),
            ));
        // refused on master side, nothing is sent
        assert!(matches!(master.read_holding(1, 0, 0).await, Err(Error::Master(_))));
        assert!(matches!(master.read_holding(1, 0, 126).await, Err(Error::Master(_))));
        assert!(matches!(master.write_multiple(1, 0, &[]).await, Err(Error::Master(_))));
    }).await;
    assert_eq!(slave.diagnostics().exceptions, 2);
}

#[tokio::test(start_paused = true)]
async fn absent_slave() {
    let slave = Slave::new(Rtu, Config::new(9600, 1));
    test(&slave, async |master| {
        assert!(matches!(master.read_holding(7, 0, 1).await, Err(Error::Timeout)));
    }).await;
}

#[tokio::test(start_paused = true)]
async fn broadcast() {
    let slave = Slave::new(Rtu, Config::new(9600, 1));
    test(&slave, async |master| {
        master.write_single(0, 2, 42).await.unwrap();
        // leave the bus silent so the next request is a separate frame
        tokio::time::sleep(2*GAP).await;
        assert_eq!(master.read_holding(1, 2, 1).await.unwrap(), [42]);
        assert!(matches!(master.read_holding(0, 2, 1).await, Err(Error::Master(_))));
    }).await;
    assert_eq!(slave.diagnostics().broadcasts, 1);
}
